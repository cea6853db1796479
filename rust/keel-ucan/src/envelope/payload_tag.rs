//! Payload type tags.

/// The type tag that names a payload inside its envelope.
///
/// The tag is the second key of the envelope payload map, e.g.
/// `ucan/dlg@1.0.0-rc.1` for delegations. It both identifies the token
/// kind and pins the wire-format version.
pub trait PayloadTag {
    /// Short identifier of the token kind (`"dlg"`, `"inv"`).
    fn spec_id() -> &'static str;

    /// Wire-format version of the token kind.
    fn version() -> &'static str;

    /// The full tag string used as the payload key.
    #[must_use]
    fn tag() -> String {
        format!("ucan/{}@{}", Self::spec_id(), Self::version())
    }
}
