//! Storage size specifiers and byte formatting
//!
//! Sizes are requested as a decimal magnitude plus a unit from the closed set
//! `KB`, `MB`, `GB`, using binary multiples (1 KB = 1024 bytes).

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

pub const KB_BYTES: u64 = 1_024;
pub const MB_BYTES: u64 = 1_048_576;
pub const GIB_BYTES: u64 = 1_073_741_824;

/// Unit of a [`SizeSpec`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SizeUnit {
    #[serde(rename = "KB")]
    Kb,
    #[serde(rename = "MB")]
    Mb,
    #[serde(rename = "GB")]
    Gb,
}

impl SizeUnit {
    /// Number of bytes in one unit
    #[must_use]
    pub const fn bytes(self) -> u64 {
        match self {
            SizeUnit::Kb => KB_BYTES,
            SizeUnit::Mb => MB_BYTES,
            SizeUnit::Gb => GIB_BYTES,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SizeUnit::Kb => "KB",
            SizeUnit::Mb => "MB",
            SizeUnit::Gb => "GB",
        }
    }
}

impl Display for SizeUnit {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SizeUnit {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "kb" => Ok(SizeUnit::Kb),
            "mb" => Ok(SizeUnit::Mb),
            "gb" => Ok(SizeUnit::Gb),
            other => Err(DomainError::InvalidSizeSpec(format!(
                "unknown unit '{other}'; valid options: KB, MB, GB"
            ))),
        }
    }
}

/// Most fractional digits accepted in a size magnitude
pub const MAX_FRACTION_DIGITS: u32 = 9;

/// A requested storage size such as `10MB` or `1.5GB`
///
/// The magnitude is a decimal kept as `mantissa / 10^scale` with trailing
/// fractional zeros stripped, so `"1.50GB"` and `"1.5GB"` are the same size
/// and display as `"1.5GB"`. Byte counts round up to a whole byte.
///
/// The string form sent to the storage provider is the magnitude directly
/// followed by the unit, e.g. `"250MB"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SizeSpec {
    mantissa: u64,
    scale: u32,
    unit: SizeUnit,
    bytes: u64,
}

impl SizeSpec {
    /// Builds a whole-number size, rejecting zero and byte counts that overflow `u64`
    pub fn new(magnitude: u64, unit: SizeUnit) -> Result<Self, DomainError> {
        Self::from_decimal(magnitude, 0, unit)
    }

    /// Builds a size of `mantissa / 10^scale` units
    pub fn from_decimal(mantissa: u64, scale: u32, unit: SizeUnit) -> Result<Self, DomainError> {
        if scale > MAX_FRACTION_DIGITS {
            return Err(DomainError::InvalidSizeSpec(format!(
                "at most {MAX_FRACTION_DIGITS} fractional digits are allowed"
            )));
        }
        if mantissa == 0 {
            return Err(DomainError::InvalidSizeSpec(format!(
                "0{unit} (size must be greater than 0)"
            )));
        }

        let (mut mantissa, mut scale) = (mantissa, scale);
        while scale > 0 && mantissa % 10 == 0 {
            mantissa /= 10;
            scale -= 1;
        }

        let divisor = 10u128.pow(scale);
        let bytes = (u128::from(mantissa) * u128::from(unit.bytes())).div_ceil(divisor);
        let bytes = u64::try_from(bytes).map_err(|_| {
            DomainError::InvalidSizeSpec(format!("{} (too large)", render(mantissa, scale, unit)))
        })?;

        Ok(Self {
            mantissa,
            scale,
            unit,
            bytes,
        })
    }

    /// Magnitude as written, without the unit (e.g. `"1.5"`)
    #[must_use]
    pub fn magnitude(&self) -> String {
        render_magnitude(self.mantissa, self.scale)
    }

    #[must_use]
    pub const fn unit(&self) -> SizeUnit {
        self.unit
    }

    /// Size in bytes, rounded up to a whole byte
    #[must_use]
    pub const fn bytes(&self) -> u64 {
        self.bytes
    }
}

fn render_magnitude(mantissa: u64, scale: u32) -> String {
    if scale == 0 {
        return mantissa.to_string();
    }
    let divisor = 10u64.pow(scale);
    format!(
        "{}.{:0width$}",
        mantissa / divisor,
        mantissa % divisor,
        width = scale as usize
    )
}

fn render(mantissa: u64, scale: u32, unit: SizeUnit) -> String {
    format!("{}{unit}", render_magnitude(mantissa, scale))
}

impl Display for SizeSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&render(self.mantissa, self.scale, self.unit))
    }
}

impl FromStr for SizeSpec {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DomainError::InvalidSizeSpec(s.to_string());

        let trimmed = s.trim();
        if trimmed.len() < 3 || !trimmed.is_char_boundary(trimmed.len() - 2) {
            return Err(invalid());
        }
        let (number, unit) = trimmed.split_at(trimmed.len() - 2);
        let unit: SizeUnit = unit.parse().map_err(|_| invalid())?;

        let number = number.trim();
        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if number.contains('.') && fraction.is_empty() {
            return Err(invalid());
        }
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let fraction = fraction.trim_end_matches('0');
        let scale = u32::try_from(fraction.len()).map_err(|_| invalid())?;
        if scale > MAX_FRACTION_DIGITS {
            return Err(invalid());
        }

        let mantissa = format!("{whole}{fraction}")
            .parse::<u64>()
            .map_err(|_| invalid())?;
        Self::from_decimal(mantissa, scale, unit)
    }
}

impl TryFrom<String> for SizeSpec {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SizeSpec> for String {
    fn from(size: SizeSpec) -> Self {
        size.to_string()
    }
}

/// Formats a byte count with two decimals in KB, MB or GB
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    let bytes_f = bytes as f64;
    if bytes < MB_BYTES {
        format!("{:.2}KB", bytes_f / KB_BYTES as f64)
    } else if bytes < GIB_BYTES {
        format!("{:.2}MB", bytes_f / MB_BYTES as f64)
    } else {
        format!("{:.2}GB", bytes_f / GIB_BYTES as f64)
    }
}

/// Cost in base token units ("shades") of reserving `size`
///
/// The network prices storage per GiB; partial GiBs are charged
/// proportionally and the result is rounded up.
#[must_use]
pub fn storage_cost(shades_per_gib: u64, size: &SizeSpec) -> u64 {
    let numerator = u128::from(size.bytes()) * u128::from(shades_per_gib);
    let gib = u128::from(GIB_BYTES);
    let cost = numerator.div_ceil(gib);
    u64::try_from(cost).unwrap_or(u64::MAX)
}
