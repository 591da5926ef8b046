use rhai::{Dynamic, Map};
use serde_json::Value;

/// Convert a serde_json::Value to a Rhai Dynamic.
pub fn json_to_dynamic(val: &Value) -> Dynamic {
    match val {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else if let Some(f) = n.as_f64() {
                Dynamic::from(f)
            } else {
                Dynamic::from(n.to_string())
            }
        }
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(arr) => {
            let rhai_arr: Vec<Dynamic> = arr.iter().map(json_to_dynamic).collect();
            Dynamic::from(rhai_arr)
        }
        Value::Object(obj) => {
            let mut map = Map::new();
            for (k, v) in obj {
                map.insert(k.clone().into(), json_to_dynamic(v));
            }
            Dynamic::from(map)
        }
    }
}

/// Convert a Rhai Dynamic to serde_json::Value.
pub fn dynamic_to_json(val: &Dynamic) -> Value {
    if val.is_unit() {
        Value::Null
    } else if val.is::<bool>() {
        Value::Bool(val.as_bool().unwrap_or(false))
    } else if val.is::<i64>() {
        Value::Number(serde_json::Number::from(val.as_int().unwrap_or(0)))
    } else if val.is::<f64>() {
        if let Ok(f) = val.as_float() {
            serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null)
        } else {
            Value::Null
        }
    } else if val.is::<String>() {
        Value::String(val.clone().into_string().unwrap_or_default())
    } else if val.is::<rhai::Array>() {
        let arr = val.clone().into_array().unwrap_or_default();
        Value::Array(arr.iter().map(dynamic_to_json).collect())
    } else if val.is::<Map>() {
        match val.clone().try_cast::<Map>() {
            Some(m) => {
                let mut obj = serde_json::Map::new();
                for (k, v) in m {
                    obj.insert(k.to_string(), dynamic_to_json(&v));
                }
                Value::Object(obj)
            }
            None => Value::String(format!("{}", val)),
        }
    } else {
        Value::String(format!("{}", val))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_roundtrip_scalars() {
        for v in [json!(null), json!(true), json!(42), json!(1.5), json!("hi")] {
            assert_eq!(dynamic_to_json(&json_to_dynamic(&v)), v);
        }
    }

    #[test]
    fn test_roundtrip_nested() {
        let v = json!({"items": [1, 2, 3], "meta": {"ok": true}});
        assert_eq!(dynamic_to_json(&json_to_dynamic(&v)), v);
    }
}
