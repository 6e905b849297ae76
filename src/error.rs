use openssl::error::ErrorStack;
use thiserror::Error;

/// Failure to obtain the signing identity from a credential store.
///
/// Every variant names the store it was raised for. The store password is never
/// part of an error.
#[derive(Debug, Error)]
pub enum CredentialLoadError {
    #[error("unable to read credential store {store}: {source}")]
    Io {
        store: String,
        #[source]
        source: std::io::Error,
    },

    #[error("credential store {store} is not a PKCS#12 container: {source}")]
    Format {
        store: String,
        #[source]
        source: ErrorStack,
    },

    #[error("unable to unlock credential store {store} (wrong password?): {source}")]
    Unlock {
        store: String,
        #[source]
        source: ErrorStack,
    },

    #[error(
        "credential store {store} must hold exactly one signing identity, \
         found {keys} private key(s) and {certificates} certificate(s)"
    )]
    EntryCount {
        store: String,
        keys: usize,
        certificates: usize,
    },

    #[error("private key in credential store {store} does not belong to its certificate")]
    KeyMismatch { store: String },

    #[error("unable to read certificate details from credential store {store}: {source}")]
    Certificate {
        store: String,
        #[source]
        source: ErrorStack,
    },

    #[error("unable to format the certificate issuer from credential store {store}: {source}")]
    IssuerName {
        store: String,
        #[source]
        source: NameError,
    },
}

/// Failure to render a distinguished name in string form.
#[derive(Debug, Error)]
pub enum NameError {
    #[error("openssl error: {0}")]
    Crypto(#[from] ErrorStack),

    #[error("malformed distinguished name: {0}")]
    Malformed(String),

    #[error("value of attribute {0} is not a character string")]
    NonStringValue(String),
}

/// Failure while building or attaching an enveloped signature.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("malformed XML document: {0}")]
    MalformedDocument(String),

    #[error("document has no root element")]
    MissingRoot,

    #[error("document already carries an enveloped signature")]
    AlreadySigned,

    #[error("document already contains an element with id {0:?}")]
    DuplicateId(String),

    #[error("unable to resolve reference {0:?}")]
    UnresolvedReference(String),

    #[error("transform failed: {0}")]
    Transform(String),

    #[error("unable to serialize XML: {0}")]
    Serialization(String),

    #[error("signing key type {0:?} is not supported, an RSA key is required")]
    UnsupportedKey(openssl::pkey::Id),

    #[error("openssl error: {0}")]
    Crypto(#[from] ErrorStack),
}

/// Either half of the signer's failure contract.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    CredentialLoad(#[from] CredentialLoadError),

    #[error(transparent)]
    Signing(#[from] SigningError),
}

pub type Result<T> = std::result::Result<T, Error>;
