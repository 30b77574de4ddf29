pub mod reply;
pub mod session;

pub use reply::{is_positive, reply_code, verb_disabled, Reply};
pub use session::{SessionOptions, SmtpSession};
