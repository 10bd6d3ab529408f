//! リソース量 (CPU / メモリ / ストレージ) のパース
//!
//! Kubernetes の quantity 表記を受け付ける:
//! `500m`, `1`, `0.5`, `128Mi`, `2Gi`, `1G`, `1e3` など。
//! 内部ではミリ単位の整数で保持するため、比較は厳密に行える。

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// パース済みのリソース量
#[derive(Debug, Clone)]
pub struct Quantity {
    milli: i128,
    text: String,
}

/// quantity のパースエラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityError {
    pub input: String,
    pub reason: &'static str,
}

impl fmt::Display for QuantityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid quantity '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for QuantityError {}

impl Quantity {
    pub fn zero() -> Self {
        Self {
            milli: 0,
            text: "0".to_string(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        let text = input.trim();
        let fail = |reason| QuantityError {
            input: input.to_string(),
            reason,
        };
        if text.is_empty() {
            return Err(fail("empty quantity"));
        }

        let unsigned = match text.as_bytes()[0] {
            b'-' => return Err(fail("negative quantities are not allowed")),
            b'+' => &text[1..],
            _ => text,
        };

        let mantissa_len = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (mantissa, suffix) = unsigned.split_at(mantissa_len);
        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(fail("missing numeric value"));
        }
        if frac_part.contains('.') {
            return Err(fail("malformed number"));
        }

        let (exp10, exp2) = parse_suffix(suffix).ok_or_else(|| fail("unknown suffix"))?;

        let digits = format!("{int_part}{frac_part}");
        let mut value: i128 = digits.parse().map_err(|_| fail("value too large"))?;
        let scale = 3 + exp10 - frac_part.len() as i32;

        value = value
            .checked_mul(1i128.checked_shl(exp2).ok_or_else(|| fail("value too large"))?)
            .ok_or_else(|| fail("value too large"))?;
        if scale >= 0 {
            let factor = 10i128
                .checked_pow(scale as u32)
                .ok_or_else(|| fail("value too large"))?;
            value = value.checked_mul(factor).ok_or_else(|| fail("value too large"))?;
        } else {
            let divisor = 10i128
                .checked_pow(scale.unsigned_abs())
                .ok_or_else(|| fail("value too small"))?;
            // 1m 未満の端数は切り上げる
            value = value / divisor + i128::from(value % divisor != 0);
        }

        Ok(Self {
            milli: value,
            text: text.to_string(),
        })
    }

    pub fn is_zero(&self) -> bool {
        self.milli == 0
    }

    /// ミリ単位の値
    pub fn milli_value(&self) -> i128 {
        self.milli
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// サフィックスを (10 の指数, 2 の指数) に変換
fn parse_suffix(suffix: &str) -> Option<(i32, u32)> {
    let pair = match suffix {
        "" => (0, 0),
        "m" => (-3, 0),
        "k" => (3, 0),
        "M" => (6, 0),
        "G" => (9, 0),
        "T" => (12, 0),
        "P" => (15, 0),
        "E" => (18, 0),
        "Ki" => (0, 10),
        "Mi" => (0, 20),
        "Gi" => (0, 30),
        "Ti" => (0, 40),
        "Pi" => (0, 50),
        "Ei" => (0, 60),
        _ => {
            let exponent = suffix.strip_prefix(['e', 'E'])?;
            let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            (exponent.parse().ok()?, 0)
        }
    };
    Some(pair)
}

impl Default for Quantity {
    fn default() -> Self {
        Self::zero()
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.milli == other.milli
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.milli.cmp(&other.milli)
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u64),
            Float(f64),
            Text(String),
        }

        let text = match Raw::deserialize(deserializer)? {
            Raw::Int(v) => v.to_string(),
            Raw::Float(v) => v.to_string(),
            Raw::Text(v) => v,
        };
        Quantity::parse(&text).map_err(serde::de::Error::custom)
    }
}
