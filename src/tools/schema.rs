//! 工具参数 JSON Schema 生成（schemars 自动生成）与参数解析

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::tools::ToolError;

/// 由参数结构体生成 function parameters schema（子结构内联，去掉 $schema / title）
pub fn schema_of<T: JsonSchema>() -> Value {
    let gen = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.option_add_null_type = false;
        })
        .into_generator();
    let root = gen.into_root_schema_for::<T>();
    let mut value = serde_json::to_value(root).unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        obj.remove("definitions");
    }
    value
}

/// 将 JSON 参数解析为结构体；失败为 Validation 错误
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = match args {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(args).map_err(|e| ToolError::Validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[allow(dead_code)]
    #[derive(Debug, Deserialize, JsonSchema)]
    struct Inner {
        name: String,
    }

    #[allow(dead_code)]
    #[derive(Debug, Deserialize, JsonSchema)]
    struct Outer {
        /// 条目
        items: Vec<Inner>,
        note: Option<String>,
    }

    #[test]
    fn test_schema_inlines_nested() {
        let s = schema_of::<Outer>();
        assert!(s.get("$schema").is_none());
        assert_eq!(s["type"], "object");
        assert_eq!(s["properties"]["items"]["items"]["properties"]["name"]["type"], "string");
        assert_eq!(s["required"], serde_json::json!(["items"]));
    }

    #[test]
    fn test_parse_args_validation() {
        let err = parse_args::<Outer>(serde_json::json!({"note": 1})).unwrap_err();
        assert!(matches!(err, ToolError::Validation(_)));
        let ok: Outer = parse_args(serde_json::json!({"items": []})).unwrap();
        assert!(ok.note.is_none());
    }
}
