use thiserror::Error;

/// Errors raised by typed-object handling and scheme conversion
#[derive(Debug, Error)]
pub enum TypeError {
    /// The object's type is not registered in the scheme
    #[error("unknown type: {0}")]
    UnknownType(String),

    /// The object carries no usable type discriminator
    #[error("object has no type")]
    MissingType,

    /// A registered decoder rejected the raw object
    #[error("cannot convert object of type {ty}: {reason}")]
    Conversion { ty: String, reason: String },
}
