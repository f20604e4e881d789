//! Redsys-style card gateway: signed redirect forms and callback decoding.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::Sha256;
use thiserror::Error;
use url::{form_urlencoded, Url};

use crate::config::PaymentConfig;
use crate::domain::order::{to_minor_units, OrderNumber};
use crate::domain::tenant::TenantId;
use crate::errors::ApplicationError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_VERSION: &str = "HMAC_SHA256_V1";
pub const FIELD_SIGNATURE_VERSION: &str = "Ds_SignatureVersion";
pub const FIELD_MERCHANT_PARAMETERS: &str = "Ds_MerchantParameters";
pub const FIELD_SIGNATURE: &str = "Ds_Signature";

/// Response code the gateway reports when the cardholder abandons payment.
pub const CANCELLED_BY_USER_CODE: u32 = 9915;
const TRANSACTION_TYPE_AUTHORISATION: &str = "0";
const MERCHANT_DATA_SEPARATOR: char = '|';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("payment secret key is not valid base64")]
    InvalidSecretKey,
    #[error("amount {0} cannot be expressed in minor units")]
    InvalidAmount(Decimal),
    #[error("notification is missing `{0}`")]
    MissingField(&'static str),
    #[error("notification field `{field}` is not decodable: {detail}")]
    InvalidEncoding { field: &'static str, detail: String },
    #[error("notification signature does not match its parameters")]
    SignatureMismatch,
    #[error("unsupported signature version `{0}`")]
    UnsupportedSignatureVersion(String),
    #[error("merchant data `{0}` is not `<order_number>|<tenant_id>`")]
    InvalidMerchantData(String),
    #[error("response code `{0}` is not numeric")]
    InvalidResponseCode(String),
}

impl From<GatewayError> for ApplicationError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::InvalidSecretKey => Self::Configuration(error.to_string()),
            other => Self::Validation(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedFormFields {
    #[serde(rename = "Ds_SignatureVersion")]
    pub signature_version: String,
    #[serde(rename = "Ds_MerchantParameters")]
    pub merchant_parameters: String,
    #[serde(rename = "Ds_Signature")]
    pub signature: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PaymentRedirect {
    pub fields: SignedFormFields,
    pub redirect_url: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentOutcome {
    Succeeded,
    Failed,
    CancelledByUser,
}

impl PaymentOutcome {
    pub fn from_response_code(code: u32) -> Self {
        match code {
            0..=99 => Self::Succeeded,
            CANCELLED_BY_USER_CODE => Self::CancelledByUser,
            _ => Self::Failed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedCallback {
    pub order_number: OrderNumber,
    pub tenant_id: TenantId,
    pub response_code: u32,
    pub outcome: PaymentOutcome,
    pub transaction_reference: Option<String>,
}

#[derive(Clone)]
pub struct RedsysGateway {
    gateway_url: String,
    merchant_code: String,
    terminal: String,
    currency: String,
    notification_url: String,
    success_url: String,
    failure_url: String,
    mac: HmacSha256,
}

impl std::fmt::Debug for RedsysGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedsysGateway")
            .field("gateway_url", &self.gateway_url)
            .field("merchant_code", &self.merchant_code)
            .field("terminal", &self.terminal)
            .finish_non_exhaustive()
    }
}

impl RedsysGateway {
    pub fn from_config(config: &PaymentConfig) -> Result<Self, GatewayError> {
        let key = config.decoded_secret_key().map_err(|_| GatewayError::InvalidSecretKey)?;
        if key.is_empty() {
            return Err(GatewayError::InvalidSecretKey);
        }
        let mac = HmacSha256::new_from_slice(&key).map_err(|_| GatewayError::InvalidSecretKey)?;

        Ok(Self {
            gateway_url: config.gateway_url.clone(),
            merchant_code: config.merchant_code.clone(),
            terminal: config.terminal.clone(),
            currency: config.currency.clone(),
            notification_url: config.notification_url.clone(),
            success_url: config.success_url.clone(),
            failure_url: config.failure_url.clone(),
            mac,
        })
    }

    pub fn gateway_url(&self) -> &str {
        &self.gateway_url
    }

    /// Signed form for an order. `merchant_code` overrides the deployment
    /// default when the tenant has its own gateway account.
    pub fn build_redirect(
        &self,
        order_number: &OrderNumber,
        amount: Decimal,
        tenant_id: TenantId,
        merchant_code: Option<&str>,
    ) -> Result<PaymentRedirect, GatewayError> {
        let minor_units = to_minor_units(amount)
            .filter(|value| *value > 0)
            .ok_or(GatewayError::InvalidAmount(amount))?;
        let merchant_data = form_urlencoded::byte_serialize(
            format!("{order_number}{MERCHANT_DATA_SEPARATOR}{tenant_id}").as_bytes(),
        )
        .collect::<String>();

        let parameters = json!({
            "DS_MERCHANT_AMOUNT": minor_units.to_string(),
            "DS_MERCHANT_ORDER": order_number.as_str(),
            "DS_MERCHANT_MERCHANTCODE": merchant_code.unwrap_or(self.merchant_code.as_str()),
            "DS_MERCHANT_CURRENCY": self.currency,
            "DS_MERCHANT_TRANSACTIONTYPE": TRANSACTION_TYPE_AUTHORISATION,
            "DS_MERCHANT_TERMINAL": self.terminal,
            "DS_MERCHANT_MERCHANTURL": self.notification_url,
            "DS_MERCHANT_URLOK": self.success_url,
            "DS_MERCHANT_URLKO": self.failure_url,
            "DS_MERCHANT_MERCHANTDATA": merchant_data,
        });

        let merchant_parameters = STANDARD.encode(parameters.to_string());
        let signature = self.sign(&merchant_parameters);

        Ok(PaymentRedirect {
            fields: SignedFormFields {
                signature_version: SIGNATURE_VERSION.to_string(),
                merchant_parameters,
                signature,
            },
            redirect_url: self.gateway_url.clone(),
        })
    }

    /// Decodes a form-encoded gateway notification. The signature is checked
    /// before any merchant data is trusted.
    pub fn parse_notification(&self, raw_body: &str) -> Result<DecodedCallback, GatewayError> {
        let mut version = None;
        let mut parameters = None;
        let mut signature = None;
        for (key, value) in form_urlencoded::parse(raw_body.as_bytes()) {
            match key.as_ref() {
                FIELD_SIGNATURE_VERSION => version = Some(value.into_owned()),
                FIELD_MERCHANT_PARAMETERS => parameters = Some(value.into_owned()),
                FIELD_SIGNATURE => signature = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(version) = version {
            if version != SIGNATURE_VERSION {
                return Err(GatewayError::UnsupportedSignatureVersion(version));
            }
        }
        let parameters = parameters.ok_or(GatewayError::MissingField(FIELD_MERCHANT_PARAMETERS))?;
        let signature = signature.ok_or(GatewayError::MissingField(FIELD_SIGNATURE))?;

        self.verify(&parameters, &signature)?;

        let decoded = decode_base64(&parameters).map_err(|detail| {
            GatewayError::InvalidEncoding { field: FIELD_MERCHANT_PARAMETERS, detail }
        })?;
        let document: Value = serde_json::from_slice(&decoded).map_err(|error| {
            GatewayError::InvalidEncoding {
                field: FIELD_MERCHANT_PARAMETERS,
                detail: error.to_string(),
            }
        })?;

        let raw_code =
            lookup_field(&document, "Ds_Response").ok_or(GatewayError::MissingField("Ds_Response"))?;
        let response_code = raw_code
            .trim()
            .parse::<u32>()
            .map_err(|_| GatewayError::InvalidResponseCode(raw_code.clone()))?;

        let merchant_data = lookup_field(&document, "Ds_MerchantData")
            .ok_or(GatewayError::MissingField("Ds_MerchantData"))?;
        let (order_number, tenant_id) = split_merchant_data(&merchant_data)?;

        let transaction_reference = lookup_field(&document, "Ds_AuthorisationCode")
            .map(|code| code.trim().to_string())
            .filter(|code| !code.is_empty())
            .or_else(|| lookup_field(&document, "Ds_Order"));

        Ok(DecodedCallback {
            order_number,
            tenant_id,
            response_code,
            outcome: PaymentOutcome::from_response_code(response_code),
            transaction_reference,
        })
    }

    pub fn sign(&self, encoded_parameters: &str) -> String {
        STANDARD.encode(self.mac(encoded_parameters).finalize().into_bytes())
    }

    fn verify(&self, encoded_parameters: &str, signature: &str) -> Result<(), GatewayError> {
        let expected = decode_base64(signature).map_err(|_| GatewayError::SignatureMismatch)?;
        self.mac(encoded_parameters)
            .verify_slice(&expected)
            .map_err(|_| GatewayError::SignatureMismatch)
    }

    fn mac(&self, encoded_parameters: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(encoded_parameters.as_bytes());
        mac
    }
}

/// Link sent to the customer; resolves to the checkout form for the order.
pub fn checkout_link(
    public_base_url: &str,
    order_number: &OrderNumber,
    amount: Decimal,
    tenant_id: TenantId,
) -> Result<String, url::ParseError> {
    let base = public_base_url.trim_end_matches('/');
    let mut link = Url::parse(&format!("{base}/api/v1/payments/checkout"))?;
    link.query_pairs_mut()
        .append_pair("order_number", order_number.as_str())
        .append_pair("amount", &format!("{amount:.2}"))
        .append_pair("tenant_id", &tenant_id.to_string());
    Ok(link.into())
}

// Gateways emit URL-safe alphabets and sometimes drop padding.
fn decode_base64(raw: &str) -> Result<Vec<u8>, String> {
    let mut normalized: String = raw
        .trim()
        .chars()
        .map(|ch| match ch {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while normalized.len() % 4 != 0 {
        normalized.push('=');
    }
    STANDARD.decode(normalized).map_err(|error| error.to_string())
}

// Field names arrive in either case depending on gateway version.
fn lookup_field(document: &Value, key: &str) -> Option<String> {
    let object = document.as_object()?;
    let value = object.get(key).or_else(|| {
        object.iter().find(|(name, _)| name.eq_ignore_ascii_case(key)).map(|(_, value)| value)
    })?;
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

fn split_merchant_data(raw: &str) -> Result<(OrderNumber, TenantId), GatewayError> {
    let decoded = form_urlencoded::parse(raw.trim().as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .unwrap_or_default();

    let invalid = || GatewayError::InvalidMerchantData(raw.to_string());
    let (order_number, tenant_id) = decoded.split_once(MERCHANT_DATA_SEPARATOR).ok_or_else(invalid)?;
    let order_number = OrderNumber::parse(order_number).ok_or_else(invalid)?;
    let tenant_id = tenant_id.parse::<TenantId>().map_err(|_| invalid())?;
    Ok((order_number, tenant_id))
}
