/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use crate::consts::FLOAT_SPECIAL_EXPONENT;

/// Exact decimal as it travels on the wire: sign, integral magnitude, and the
/// fractional digits stored in reverse so that trailing information survives
/// (".070" keeps its leading zero as reversed digits "070" -> 70 with the
/// convention that the reversal happens digit-wise).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExiDecimal {
    pub negative: bool,
    pub integral: u64,
    pub fractional_reversed: u64,
}

impl ExiDecimal {
    pub fn from_parts(negative: bool, integral: u64, fraction_digits: &str) -> Self {
        let mut fractional_reversed = 0u64;
        for d in fraction_digits.chars().rev() {
            fractional_reversed = fractional_reversed * 10 + d.to_digit(10).unwrap_or(0) as u64;
        }
        ExiDecimal {
            negative,
            integral,
            fractional_reversed,
        }
    }
}

/// Base-10 float: value = mantissa * 10^exponent. The reserved exponent
/// -(2^14) marks the specials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExiFloat {
    pub mantissa: i64,
    pub exponent: i32,
}

impl ExiFloat {
    pub const INFINITY: ExiFloat = ExiFloat {
        mantissa: 1,
        exponent: FLOAT_SPECIAL_EXPONENT as i32,
    };
    pub const NEG_INFINITY: ExiFloat = ExiFloat {
        mantissa: -1,
        exponent: FLOAT_SPECIAL_EXPONENT as i32,
    };
    pub const NAN: ExiFloat = ExiFloat {
        mantissa: 0,
        exponent: FLOAT_SPECIAL_EXPONENT as i32,
    };

    pub fn is_special(&self) -> bool {
        i64::from(self.exponent) == FLOAT_SPECIAL_EXPONENT
    }

    pub fn from_f64(v: f64) -> Self {
        if v.is_nan() {
            return Self::NAN;
        }
        if v.is_infinite() {
            return if v > 0.0 { Self::INFINITY } else { Self::NEG_INFINITY };
        }

        let mut mantissa = v;
        let mut exponent = 0i32;
        while mantissa.fract() != 0.0 && exponent > -18 {
            mantissa *= 10.0;
            exponent -= 1;
        }
        ExiFloat {
            mantissa: mantissa as i64,
            exponent,
        }
    }

    pub fn to_f64(&self) -> f64 {
        if self.is_special() {
            return match self.mantissa {
                1 => f64::INFINITY,
                -1 => f64::NEG_INFINITY,
                _ => f64::NAN,
            };
        }
        self.mantissa as f64 * 10f64.powi(self.exponent)
    }
}

/// Which fields of the date-time representation a schema type carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateTimeKind {
    DateTime,
    Date,
    Time,
    GYearMonth,
    GYear,
    GMonthDay,
    GMonth,
    GDay,
}

impl DateTimeKind {
    pub fn has_year(&self) -> bool {
        matches!(
            self,
            DateTimeKind::DateTime | DateTimeKind::Date | DateTimeKind::GYearMonth | DateTimeKind::GYear
        )
    }

    pub fn has_month_day(&self) -> bool {
        !matches!(self, DateTimeKind::GYear | DateTimeKind::Time)
    }

    pub fn has_time(&self) -> bool {
        matches!(self, DateTimeKind::DateTime | DateTimeKind::Time)
    }
}

/// Decomposed date-time value. Absent fields stay at their defaults and are
/// not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExiDateTime {
    pub kind: DateTimeKind,
    pub year: i64,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub fractional_secs: Option<u64>,
    pub timezone_minutes: Option<i32>,
}

impl ExiDateTime {
    pub fn new(kind: DateTimeKind) -> Self {
        ExiDateTime {
            kind,
            year: 0,
            month: 0,
            day: 0,
            hour: 0,
            minute: 0,
            second: 0,
            fractional_secs: None,
            timezone_minutes: None,
        }
    }
}

/// A typed content item crossing the codec boundary in either direction.
#[derive(Debug, Clone, PartialEq)]
pub enum ExiValue {
    String(String),
    Integer(i64),
    NonNegativeInteger(u64),
    Boolean(bool),
    Decimal(ExiDecimal),
    Float(ExiFloat),
    Binary(Vec<u8>),
    DateTime(ExiDateTime),
    /// Resolved qname value (uri, local-name), e.g. an xsi:type target
    QName(String, String),
    /// Space-separated list items, each re-dispatched on the item type
    List(Vec<ExiValue>),
}
