//! Serde model of the XML-DSig elements emitted by the signer, all under the
//! `ds` prefix.

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OuterSignature {
    #[serde(rename = "{http://www.w3.org/2000/09/xmldsig#}ds:Signature")]
    pub signature: Signature,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OuterSignedInfo {
    #[serde(rename = "{http://www.w3.org/2000/09/xmldsig#}ds:SignedInfo")]
    pub signed_info: SignedInfo,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct OuterKeyInfo {
    #[serde(rename = "{http://www.w3.org/2000/09/xmldsig#}ds:KeyInfo")]
    pub key_info: KeyInfo,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Signature {
    #[serde(rename = "{http://www.w3.org/2000/09/xmldsig#}ds:SignedInfo")]
    pub signed_info: SignedInfo,
    #[serde(rename = "{http://www.w3.org/2000/09/xmldsig#}ds:SignatureValue")]
    pub signature_value: SignatureValue,
    #[serde(rename = "{http://www.w3.org/2000/09/xmldsig#}ds:KeyInfo")]
    pub key_info: Option<KeyInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SignatureValue {
    #[serde(rename = "$value")]
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SignedInfo {
    #[serde(rename = "{http://www.w3.org/2000/09/xmldsig#}ds:CanonicalizationMethod")]
    pub canonicalization_method: CanonicalizationMethod,
    #[serde(rename = "{http://www.w3.org/2000/09/xmldsig#}ds:SignatureMethod")]
    pub signature_method: SignatureMethod,
    #[serde(rename = "{http://www.w3.org/2000/09/xmldsig#}ds:Reference")]
    pub reference: Vec<Reference>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CanonicalizationMethod {
    #[serde(rename = "$attr:Algorithm")]
    pub algorithm: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SignatureMethod {
    #[serde(rename = "$attr:Algorithm")]
    pub algorithm: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Reference {
    #[serde(
        rename = "{http://www.w3.org/2000/09/xmldsig#}ds:Transforms",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub transforms: Option<Transforms>,
    #[serde(rename = "{http://www.w3.org/2000/09/xmldsig#}ds:DigestMethod")]
    pub digest_method: DigestMethod,
    #[serde(rename = "{http://www.w3.org/2000/09/xmldsig#}ds:DigestValue")]
    pub digest_value: String,
    #[serde(rename = "$attr:URI", default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Transforms {
    #[serde(rename = "{http://www.w3.org/2000/09/xmldsig#}ds:Transform")]
    pub transforms: Vec<Transform>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Transform {
    #[serde(rename = "$attr:Algorithm")]
    pub algorithm: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DigestMethod {
    #[serde(rename = "$attr:Algorithm")]
    pub algorithm: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KeyInfo {
    #[serde(rename = "$value")]
    pub keys_info: Vec<KeyInfoType>,
    #[serde(rename = "$attr:Id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum KeyInfoType {
    #[serde(rename = "{http://www.w3.org/2000/09/xmldsig#}ds:X509Data")]
    X509Data(X509Data),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct X509Data {
    #[serde(rename = "$value")]
    pub x509_data: Vec<X509Datum>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum X509Datum {
    #[serde(rename = "{http://www.w3.org/2000/09/xmldsig#}ds:X509IssuerSerial")]
    IssuerSerial(X509IssuerSerial),
}

/// Serial numbers are carried as decimal strings; X.509 allows up to 20 octets.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct X509IssuerSerial {
    #[serde(rename = "{http://www.w3.org/2000/09/xmldsig#}ds:X509IssuerName")]
    pub issuer_name: String,
    #[serde(rename = "{http://www.w3.org/2000/09/xmldsig#}ds:X509SerialNumber")]
    pub serial_number: String,
}
