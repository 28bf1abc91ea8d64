//! # PayU Hashes
//!
//! PayU signs requests and responses with a SHA-512 over pipe-joined fields
//! and the merchant salt. Hashes are lowercase hex.

use sha2::{Digest, Sha512};

/// User-defined fields `udf1`..`udf5`
pub type Udfs<'a> = [&'a str; 5];

/// Fields shared by the request and response hash
#[derive(Debug, Clone, Copy)]
pub struct HashFields<'a> {
    pub key: &'a str,
    pub txnid: &'a str,
    pub amount: &'a str,
    pub productinfo: &'a str,
    pub firstname: &'a str,
    pub email: &'a str,
    pub udf: Udfs<'a>,
}

pub fn sha512_hex(input: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash sent with the checkout form:
/// `key|txnid|amount|productinfo|firstname|email|udf1|..|udf5||||||salt`
pub fn request_hash(fields: &HashFields<'_>, salt: &str) -> String {
    let [udf1, udf2, udf3, udf4, udf5] = fields.udf;
    let input = format!(
        "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}||||||{}",
        fields.key,
        fields.txnid,
        fields.amount,
        fields.productinfo,
        fields.firstname,
        fields.email,
        udf1,
        udf2,
        udf3,
        udf4,
        udf5,
        salt
    );
    sha512_hex(&input)
}

/// Reverse hash PayU sends back:
/// `[additionalCharges|]salt|status||||||udf5|..|udf1|email|firstname|productinfo|amount|txnid|key`
pub fn response_hash(
    fields: &HashFields<'_>,
    status: &str,
    salt: &str,
    additional_charges: Option<&str>,
) -> String {
    let [udf1, udf2, udf3, udf4, udf5] = fields.udf;
    let body = format!(
        "{}|{}||||||{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
        salt,
        status,
        udf5,
        udf4,
        udf3,
        udf2,
        udf1,
        fields.email,
        fields.firstname,
        fields.productinfo,
        fields.amount,
        fields.txnid,
        fields.key
    );
    let input = match additional_charges {
        Some(charges) if !charges.is_empty() => format!("{}|{}", charges, body),
        _ => body,
    };
    sha512_hex(&input)
}

/// Hash for postservice commands: `key|command|var1|salt`
pub fn command_hash(key: &str, command: &str, var1: &str, salt: &str) -> String {
    sha512_hex(&format!("{}|{}|{}|{}", key, command, var1, salt))
}

/// Compare two hex digests without short-circuiting on the first difference
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.trim().to_ascii_lowercase();
    let b = b.trim().to_ascii_lowercase();
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0, |acc, (x, y)| acc | (x ^ y))
        == 0
}
