//! On-disk session record.
//!
//! Text form, three colon-separated fields:
//!
//! ```text
//! <hex(mac)>:<base64(iv)>:<base64(ciphertext)>
//! ```
//!
//! Any parse problem is reported as `AuthenticationFailure`; a record that
//! cannot be parsed is treated exactly like one whose MAC does not match.

use crate::error::{Result, SessionError};
use base64::{engine::general_purpose, Engine as _};

pub const MAC_LEN: usize = 32;
pub const IV_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub mac: [u8; MAC_LEN],
    pub iv: [u8; IV_LEN],
    pub ciphertext: Vec<u8>,
}

impl SessionRecord {
    pub fn to_text(&self) -> String {
        format!(
            "{}:{}:{}",
            hex::encode(self.mac),
            general_purpose::STANDARD.encode(self.iv),
            general_purpose::STANDARD.encode(&self.ciphertext)
        )
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut fields = text.trim_end_matches(['\r', '\n']).split(':');
        let (Some(mac), Some(iv), Some(ciphertext), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(SessionError::AuthenticationFailure);
        };

        let mut mac_bytes = [0u8; MAC_LEN];
        hex::decode_to_slice(mac, &mut mac_bytes).map_err(|_| SessionError::AuthenticationFailure)?;

        let iv: [u8; IV_LEN] = general_purpose::STANDARD
            .decode(iv)
            .ok()
            .and_then(|v| v.try_into().ok())
            .ok_or(SessionError::AuthenticationFailure)?;

        let ciphertext = general_purpose::STANDARD
            .decode(ciphertext)
            .map_err(|_| SessionError::AuthenticationFailure)?;

        Ok(Self {
            mac: mac_bytes,
            iv,
            ciphertext,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SessionRecord {
        SessionRecord {
            mac: [0x11; MAC_LEN],
            iv: [0x22; IV_LEN],
            ciphertext: vec![0x33; 32],
        }
    }

    #[test]
    fn text_form_has_three_fields() {
        let text = sample().to_text();
        let fields: Vec<_> = text.split(':').collect();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[0], "11".repeat(MAC_LEN));
        assert_eq!(SessionRecord::parse(&text).unwrap(), sample());
    }

    #[test]
    fn tolerates_trailing_newline() {
        let text = format!("{}\n", sample().to_text());
        assert_eq!(SessionRecord::parse(&text).unwrap(), sample());
    }

    #[test]
    fn malformed_records_fail_authentication() {
        let good = sample().to_text();
        let mut fields: Vec<String> = good.split(':').map(str::to_string).collect();
        let mac = fields[0].clone();

        let cases = [
            String::new(),
            "only-one-field".to_string(),
            format!("{}:{}", fields[0], fields[1]),
            format!("{good}:extra"),
            format!("zz{}:{}:{}", &mac[2..], fields[1], fields[2]),
            format!("{}:{}:{}", &mac[2..], fields[1], fields[2]),
            format!("{}:%%%:{}", fields[0], fields[2]),
            format!("{}:{}:", fields[0], general_purpose::STANDARD.encode([0u8; 8])),
            {
                fields[2] = "not*base64".to_string();
                fields.join(":")
            },
        ];
        for case in cases {
            assert!(
                matches!(
                    SessionRecord::parse(&case),
                    Err(SessionError::AuthenticationFailure)
                ),
                "parsed {case:?}"
            );
        }
    }
}
