//! Serde model of the knowledge base's entity JSON (`wbgetentities`).
//!
//! Only the parts the portal reads are modelled. Snaks and datavalue payloads
//! are taken from raw JSON so an odd value degrades one snak instead of the
//! whole entity.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::lang::LanguagePreference;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(default, deserialize_with = "map_or_empty_list")]
    pub labels: BTreeMap<String, LangValue>,
    #[serde(default, deserialize_with = "map_or_empty_list")]
    pub descriptions: BTreeMap<String, LangValue>,
    #[serde(default, deserialize_with = "map_or_empty_list")]
    pub aliases: BTreeMap<String, Vec<LangValue>>,
    #[serde(default, deserialize_with = "map_or_empty_list")]
    pub claims: BTreeMap<String, Vec<Statement>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LangValue {
    pub language: String,
    pub value: String,
}

/// Statements and snaks are read leniently from raw JSON: a malformed snak
/// surfaces as missing fields for the snak parser to reject, never as an
/// entity-level deserialization error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "Value")]
pub struct Statement {
    pub mainsnak: Option<Snak>,
    pub qualifiers: BTreeMap<String, Vec<Snak>>,
    pub references: Vec<Reference>,
}

#[derive(Debug, Clone, Default)]
pub struct Reference {
    pub snaks: BTreeMap<String, Vec<Snak>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(from = "Value")]
pub struct Snak {
    pub snaktype: Option<String>,
    pub property: Option<String>,
    pub datatype: Option<String>,
    pub datavalue: Option<DataValue>,
}

#[derive(Debug, Clone, Default)]
pub struct DataValue {
    /// The `type` tag; `None` when absent or not a string.
    pub kind: Option<String>,
    pub value: Value,
}

fn string_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// `{pid: [snak, ..]}`; anything else reads as empty.
fn snak_map(value: Option<&Value>) -> BTreeMap<String, Vec<Snak>> {
    let Some(Value::Object(map)) = value else {
        return BTreeMap::new();
    };
    map.iter()
        .map(|(pid, snaks)| {
            let snaks = snaks
                .as_array()
                .map(|list| list.iter().cloned().map(Snak::from).collect())
                .unwrap_or_default();
            (pid.clone(), snaks)
        })
        .collect()
}

impl From<Value> for Statement {
    fn from(value: Value) -> Self {
        let references = value
            .get("references")
            .and_then(Value::as_array)
            .map(|refs| {
                refs.iter()
                    .map(|r| Reference {
                        snaks: snak_map(r.get("snaks")),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self {
            mainsnak: value
                .get("mainsnak")
                .filter(|s| s.is_object())
                .cloned()
                .map(Snak::from),
            qualifiers: snak_map(value.get("qualifiers")),
            references,
        }
    }
}

impl From<Value> for Snak {
    fn from(value: Value) -> Self {
        let datavalue = value
            .get("datavalue")
            .filter(|d| d.is_object())
            .map(|d| DataValue {
                kind: string_field(d, "type"),
                value: d.get("value").cloned().unwrap_or(Value::Null),
            });
        Self {
            snaktype: string_field(&value, "snaktype"),
            property: string_field(&value, "property"),
            datatype: string_field(&value, "datatype"),
            datavalue,
        }
    }
}

impl Entity {
    pub fn from_json(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn label(&self, langs: &LanguagePreference) -> Option<&str> {
        langs
            .pick(&self.labels, |v| v.value.is_empty())
            .map(|v| v.value.as_str())
    }

    pub fn description(&self, langs: &LanguagePreference) -> Option<&str> {
        langs
            .pick(&self.descriptions, |v| v.value.is_empty())
            .map(|v| v.value.as_str())
    }

    pub fn aliases(&self, langs: &LanguagePreference) -> Vec<String> {
        langs
            .pick(&self.aliases, Vec::is_empty)
            .map(|values| values.iter().map(|v| v.value.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of statements per property.
    pub fn property_counts(&self) -> BTreeMap<String, usize> {
        self.claims
            .iter()
            .map(|(pid, statements)| (pid.clone(), statements.len()))
            .collect()
    }
}

impl Statement {
    /// Snaks of the first reference, the only one the portal displays.
    pub fn first_reference(&self) -> Option<&BTreeMap<String, Vec<Snak>>> {
        self.references.first().map(|r| &r.snaks)
    }
}

/// Empty maps are serialized as `[]` by the knowledge base.
fn map_or_empty_list<'de, D, V>(deserializer: D) -> Result<BTreeMap<String, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum MapOrList<V> {
        Map(BTreeMap<String, V>),
        List(Vec<Value>),
    }

    match MapOrList::deserialize(deserializer)? {
        MapOrList::Map(map) => Ok(map),
        MapOrList::List(list) if list.is_empty() => Ok(BTreeMap::new()),
        MapOrList::List(_) => Err(serde::de::Error::custom(
            "expected an object or an empty list",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "type": "item",
            "id": "Q2195",
            "labels": {
                "en": {"language": "en", "value": "JPEG File Interchange Format"},
                "de": {"language": "de", "value": "JFIF"}
            },
            "descriptions": [],
            "aliases": {"en": [
                {"language": "en", "value": "JFIF"},
                {"language": "en", "value": "JPEG/JFIF"}
            ]},
            "claims": {
                "P31": [{
                    "mainsnak": {
                        "snaktype": "value",
                        "property": "P31",
                        "datatype": "wikibase-item",
                        "datavalue": {
                            "type": "wikibase-entityid",
                            "value": {"entity-type": "item", "numeric-id": 235557, "id": "Q235557"}
                        }
                    },
                    "type": "statement",
                    "rank": "normal",
                    "qualifiers": [],
                    "references": [{"hash": "abc", "snaks": {"P248": [{
                        "snaktype": "value",
                        "property": "P248",
                        "datatype": "wikibase-item",
                        "datavalue": {"type": "wikibase-entityid", "value": {"entity-type": "item", "id": "Q1"}}
                    }]}}]
                }, {
                    "mainsnak": {"snaktype": "novalue", "property": "P31", "datatype": "wikibase-item"}
                }]
            }
        })
    }

    #[test]
    fn tolerates_empty_list_maps() {
        let entity = Entity::from_json(sample()).expect("entity");
        assert!(entity.descriptions.is_empty());
        assert!(entity.claims["P31"][0].qualifiers.is_empty());
        assert_eq!(entity.property_counts()["P31"], 2);
    }

    #[test]
    fn language_selection() {
        let entity = Entity::from_json(sample()).expect("entity");
        let de = LanguagePreference::new("de", "en");
        assert_eq!(entity.label(&de), Some("JFIF"));
        // No German aliases: fall back to English.
        assert_eq!(entity.aliases(&de), vec!["JFIF", "JPEG/JFIF"]);
        assert_eq!(entity.description(&de), None);
    }

    #[test]
    fn malformed_snaks_keep_the_entity() {
        let mut value = sample();
        value["claims"]["P999"] = json!([
            {"mainsnak": {"snaktype": "value", "property": "P999", "datavalue": {"value": "no type tag"}}},
            {"mainsnak": {"snaktype": 7, "datavalue": "not an object"}, "qualifiers": {"P580": "oops"}}
        ]);
        let entity = Entity::from_json(value).expect("entity");
        assert_eq!(entity.property_counts()["P999"], 2);

        let untyped = entity.claims["P999"][0].mainsnak.as_ref().expect("snak");
        let datavalue = untyped.datavalue.as_ref().expect("datavalue");
        assert_eq!(datavalue.kind, None);
        assert_eq!(datavalue.value, json!("no type tag"));

        let odd = &entity.claims["P999"][1];
        let snak = odd.mainsnak.as_ref().expect("snak");
        assert!(snak.snaktype.is_none());
        assert!(snak.datavalue.is_none());
        assert!(odd.qualifiers["P580"].is_empty());
    }

    #[test]
    fn first_reference_snaks() {
        let entity = Entity::from_json(sample()).expect("entity");
        let reference = entity.claims["P31"][0].first_reference().expect("reference");
        assert!(reference.contains_key("P248"));
        assert!(entity.claims["P31"][1].first_reference().is_none());
    }
}
