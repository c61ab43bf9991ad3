//! Session and unique id generation.
//!
//! Ids combine a base-36 timestamp, an optional server identifier and random alphanumeric
//! characters. Uniqueness is probabilistic and the ids are not suitable as secrets.

use crate::session::now_millis;
use rand::Rng;
use rand::distributions::Alphanumeric;

/// Separates the timestamp prefix from the rest of a session id.
pub(crate) const SEPARATOR: char = '-';

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// `<base36 timestamp>-<server_id><random padding>`, exactly `length` bytes.
///
/// A server id that does not fit is cut at a character boundary and the rest is padded.
pub fn generate_session_id(length: usize, server_id: &str) -> String {
    let mut id = to_base36(now_millis());
    id.push(SEPARATOR);
    id.push_str(server_id);

    let mut cut = length.min(id.len());
    while !id.is_char_boundary(cut) {
        cut -= 1;
    }
    id.truncate(cut);

    let missing = length - id.len();
    id.extend(random_chars(missing));
    id
}

/// `<base36 timestamp><server_id><random chars>`, variable length.
pub fn generate_unique_id(random_len: usize, server_id: &str) -> String {
    let mut id = to_base36(now_millis());
    id.push_str(server_id);
    id.extend(random_chars(random_len));
    id
}

/// Decodes the creation timestamp of a session id, if it has the expected shape.
pub(crate) fn timestamp_of(id: &str) -> Option<u64> {
    let (prefix, _) = id.split_once(SEPARATOR)?;
    from_base36(prefix)
}

fn random_chars(count: usize) -> impl Iterator<Item = char> {
    rand::thread_rng().sample_iter(Alphanumeric).take(count).map(char::from)
}

pub(crate) fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".into();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

pub(crate) fn from_base36(value: &str) -> Option<u64> {
    if value.is_empty() {
        return None;
    }
    u64::from_str_radix(value, 36).ok()
}
