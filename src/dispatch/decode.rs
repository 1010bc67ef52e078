//! Reply decoding.

use serde::Deserialize;

use crate::core::Person;
use crate::dispatch::RawReply;
use crate::{Error, Result};

/// Turns a raw reply into a domain payload.
pub trait Decode<T>: Send + Sync {
    fn decode(&self, reply: &RawReply) -> Result<T>;
}

/// Longest body excerpt carried by a transport error.
const BODY_EXCERPT_CHARS: usize = 200;

/// Reject any reply whose status class is not 2xx.
///
/// The error text is the status reason, followed by an excerpt of the body
/// when the service sent one.
pub fn require_success(reply: &RawReply) -> Result<()> {
    if reply.is_success() {
        return Ok(());
    }
    let body = reply.body.trim();
    let text = if body.is_empty() {
        reply.status_text.clone()
    } else {
        format!("{} ({})", reply.status_text, excerpt(body))
    };
    Err(Error::Transport {
        status: reply.status,
        text,
    })
}

fn excerpt(body: &str) -> String {
    let mut chars = body.chars();
    let head: String = chars.by_ref().take(BODY_EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}

#[derive(Debug, Deserialize)]
struct WirePerson {
    name: String,
    surname: String,
    gender: String,
    region: String,
}

/// Decodes `{"name", "surname", "gender", "region"}` objects into a `Person`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PersonDecoder;

impl Decode<Person> for PersonDecoder {
    fn decode(&self, reply: &RawReply) -> Result<Person> {
        require_success(reply)?;
        let wire: WirePerson =
            serde_json::from_str(&reply.body).map_err(|e| Error::Decode(e.to_string()))?;
        Ok(Person {
            first_name: wire.name,
            last_name: wire.surname,
            location: wire.region,
            female: wire.gender == "female",
        })
    }
}
