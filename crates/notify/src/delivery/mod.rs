pub mod email;
pub mod sms;
pub mod webhook;
