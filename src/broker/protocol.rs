//! Negotiation role tags and the info-reply encoding.
//!
//! The first framed message on any connection is a single-byte payload
//! carrying one of [`role`]'s tags. Everything past negotiation is either
//! opaque dataset payloads or, for an info request, the comma-joined
//! dataset list described below.

/// One-byte role tags sent as the first frame's payload during negotiation.
pub mod role {
    /// Info request: reply with the dataset list, then close.
    pub const INFO: u8 = 0xDE;
    /// Source attach: the next frame names the dataset to produce into.
    pub const SOURCE: u8 = 0xBE;
    /// Sink attach: the next frame names the dataset to consume from.
    pub const SINK: u8 = 0xEF;
}

/// Encode the registered dataset names as the comma-joined UTF-8 payload
/// an info request expects.
pub fn encode_dataset_list<I, S>(names: I) -> Vec<u8>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = names
        .into_iter()
        .map(|n| n.as_ref().to_owned())
        .collect::<Vec<_>>()
        .join(",");
    joined.into_bytes()
}
