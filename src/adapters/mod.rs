// Adapters layer: concrete implementations of the domain ports.

pub mod portal;
pub mod twilio;

pub use portal::PortalSession;
pub use twilio::TwilioNotifier;
