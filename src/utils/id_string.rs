//! Snowflake ids are i64 and can exceed JavaScript's safe integer range, so
//! they cross the wire as JSON strings. Deserialization accepts either form.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub fn serialize<S>(value: &i64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    value.to_string().serialize(serializer)
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(i64),
    }
    match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
        Raw::Num(n) => Ok(n),
    }
}

pub mod opt {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => v.to_string().serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Str(String),
            Num(i64),
            Null,
        }
        match Option::<Raw>::deserialize(deserializer)? {
            None | Some(Raw::Null) => Ok(None),
            Some(Raw::Str(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
            Some(Raw::Num(n)) => Ok(Some(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super")]
        id: i64,
        #[serde(with = "super::opt")]
        parent: Option<i64>,
    }

    #[test]
    fn serializes_ids_as_strings() {
        let json = serde_json::to_string(&Wrapper {
            id: 9007199254740993,
            parent: Some(1),
        })
        .unwrap();
        assert_eq!(json, r#"{"id":"9007199254740993","parent":"1"}"#);
    }

    #[test]
    fn accepts_string_or_number_on_input() {
        let w: Wrapper = serde_json::from_str(r#"{"id":"12","parent":34}"#).unwrap();
        assert_eq!(w.id, 12);
        assert_eq!(w.parent, Some(34));

        let w: Wrapper = serde_json::from_str(r#"{"id":12,"parent":null}"#).unwrap();
        assert_eq!(w.id, 12);
        assert_eq!(w.parent, None);
    }
}
