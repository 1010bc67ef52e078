//! The outbound dispatch path.
//!
//! A dispatch issues a correlation token, has the [`Pacer`] admit the call,
//! performs it through a [`Transport`], decodes the reply, and publishes the
//! outcome for the token on a notification channel.

mod decode;
mod dispatcher;
mod pacer;
mod transport;

pub use decode::{require_success, Decode, PersonDecoder};
pub use dispatcher::Dispatcher;
pub use pacer::{Admission, Clock, ManualClock, Pacer, TokioClock};
pub use transport::{HttpTransport, RawReply, Transport};
