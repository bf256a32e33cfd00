pub(crate) mod redact;
pub(crate) mod text;
