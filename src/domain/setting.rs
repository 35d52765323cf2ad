use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingCategory {
    General,
    Security,
    Notification,
    Backup,
}

impl SettingCategory {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Security => "security",
            Self::Notification => "notification",
            Self::Backup => "backup",
        }
    }
}

impl FromStr for SettingCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(Self::General),
            "security" => Ok(Self::Security),
            "notification" => Ok(Self::Notification),
            "backup" => Ok(Self::Backup),
            other => Err(format!("unknown setting category '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingValueType {
    String,
    Number,
    Boolean,
    Json,
}

impl SettingValueType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Json => "json",
        }
    }

    /// Checks that `value` parses as this type. Empty strings are allowed
    /// for the `string` type only.
    pub fn check(self, value: &str) -> Result<(), String> {
        let ok = match self {
            Self::String => true,
            Self::Number => value.trim().parse::<f64>().is_ok_and(f64::is_finite),
            Self::Boolean => matches!(value, "true" | "false"),
            Self::Json => serde_json::from_str::<serde_json::Value>(value).is_ok(),
        };
        if ok {
            Ok(())
        } else {
            Err(format!("value is not a valid {}", self.as_str()))
        }
    }
}

impl FromStr for SettingValueType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown value type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Setting {
    pub id: i64,
    pub key: String,
    pub value: String,
    pub category: SettingCategory,
    pub value_type: SettingValueType,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSetting {
    pub key: String,
    pub value: String,
    pub category: SettingCategory,
    pub value_type: SettingValueType,
    pub label: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_type_checks() {
        assert!(SettingValueType::Number.check("30").is_ok());
        assert!(SettingValueType::Number.check("thirty").is_err());
        assert!(SettingValueType::Boolean.check("true").is_ok());
        assert!(SettingValueType::Boolean.check("yes").is_err());
        assert!(SettingValueType::Json.check(r#"{"a":1}"#).is_ok());
        assert!(SettingValueType::Json.check("{").is_err());
        assert!(SettingValueType::String.check("").is_ok());
    }
}
