//! 响应序列化
//!
//! 把读模型与 `EntityIdentifier` 转为线上 JSON。调用方可通过查询参数
//! `fields=a,b` 裁剪返回字段（仅限资源声明的可返回字段），`pretty=true` 美化输出。
//!
use crate::error::AppError;
use cmdsrc_domain::error::DomainError;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// 查询参数（单值）
pub type QueryParams = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseSettings {
    pretty: bool,
    fields: Option<BTreeSet<String>>,
}

impl ResponseSettings {
    pub fn from_query(params: &QueryParams) -> Self {
        let pretty = params
            .get("pretty")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
        let fields = params
            .get("fields")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect::<BTreeSet<_>>()
            })
            .filter(|set| !set.is_empty());
        Self { pretty, fields }
    }

    pub fn pretty(&self) -> bool {
        self.pretty
    }

    pub fn fields(&self) -> Option<&BTreeSet<String>> {
        self.fields.as_ref()
    }
}

/// 序列化并按 `fields` 裁剪顶层字段；`allowed` 之外的字段名被忽略
pub fn serialize<T: Serialize>(
    settings: &ResponseSettings,
    data: &T,
    allowed: &[&str],
) -> Result<String, AppError> {
    let value = serde_json::to_value(data).map_err(DomainError::from)?;
    let value = match (settings.fields(), value) {
        (Some(fields), Value::Object(map)) => Value::Object(retain_fields(map, fields, allowed)),
        (_, other) => other,
    };
    render(settings, &value)
}

/// 写操作结果原样输出
pub fn serialize_plain<T: Serialize>(data: &T) -> Result<String, AppError> {
    render(&ResponseSettings::default(), data)
}

fn retain_fields(
    map: Map<String, Value>,
    fields: &BTreeSet<String>,
    allowed: &[&str],
) -> Map<String, Value> {
    map.into_iter()
        .filter(|(k, _)| fields.contains(k) && allowed.contains(&k.as_str()))
        .collect()
}

fn render<T: Serialize + ?Sized>(settings: &ResponseSettings, value: &T) -> Result<String, AppError> {
    let out = if settings.pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    Ok(out.map_err(DomainError::from)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_fields_and_pretty() {
        let s = ResponseSettings::from_query(&params(&[("fields", "id, name,,"), ("pretty", "TRUE")]));
        assert!(s.pretty());
        assert_eq!(
            s.fields().unwrap().iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["id", "name"]
        );

        let empty = ResponseSettings::from_query(&params(&[("fields", " , ")]));
        assert!(empty.fields().is_none());
    }

    #[test]
    fn retains_only_requested_and_allowed_fields() {
        let data = json!({"id": 1, "name": "fee", "secret": "x"});
        let s = ResponseSettings::from_query(&params(&[("fields", "id,secret")]));
        let out = serialize(&s, &data, &["id", "name"]).unwrap();
        assert_eq!(out, r#"{"id":1}"#);
    }

    #[test]
    fn no_fields_means_full_object() {
        let data = json!({"id": 1, "name": "fee"});
        let out = serialize(&ResponseSettings::default(), &data, &["id"]).unwrap();
        let back: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(back, data);
    }
}
