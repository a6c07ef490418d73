pub mod gcal;
pub mod oauth;

pub use gcal::CalendarClient;
pub use oauth::CredentialStore;
