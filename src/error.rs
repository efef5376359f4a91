//! Error taxonomy.
//!
//! Only data-level conditions surface as [`Error`] values. Configuration
//! mistakes (layout calls on a renderer with no font, sizer or rasterizer
//! installed) are programmer errors and panic at the start of the offending
//! call.

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The active font has no mapping for a code point and no miss handler
    /// is installed. Installing one with
    /// [`Renderer::set_miss_handler`](crate::Renderer::set_miss_handler)
    /// turns this into a substitution or skip policy.
    #[error("no glyph for {0:?} in the active font")]
    MissingGlyph(char),

    /// A twine buffer failed to decode. Twines are produced by the builder,
    /// which never emits invalid sequences; this indicates corruption or a
    /// builder/renderer mismatch (e.g. an unregistered effect key).
    #[error("malformed twine: {0}")]
    MalformedTwine(&'static str),

    /// The requested path is deliberately unimplemented, as opposed to a
    /// data error.
    #[error("not implemented: {0}")]
    Unimplemented(&'static str),
}
