pub mod firewall;
pub mod golden_fact;
pub mod health;
pub mod placeholder;
