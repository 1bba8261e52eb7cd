// Domain layer: core models and ports (interfaces) for the portal and the notifier.

pub mod model;
pub mod ports;
