mod property_detail;
mod property_form;
mod property_list;
mod tenant_detail;
mod tenant_form;
mod tenant_list;

pub use property_detail::PropertyDetailView;
pub use property_form::PropertyFormView;
pub use property_list::PropertyListView;
pub use tenant_detail::TenantDetailView;
pub use tenant_form::TenantFormView;
pub use tenant_list::TenantListView;
