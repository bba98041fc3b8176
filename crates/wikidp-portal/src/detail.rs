//! Entity detail: an item reshaped into label, aliases, claims, external
//! links and categories.

use std::collections::BTreeMap;

use serde::Serialize;
use wikidp_sparql::ids::{entity_id_to_int, format_item_url};
use wikidp_sparql::Row;

use crate::error::Result;
use crate::index::PropertyIndex;
use crate::model::{Entity, Statement};
use crate::portal::Portal;
use crate::snak::{parse_snak, parse_snak_set, ParsedSnak, SnakContext, SnakGroup};

/// `instance of` and `subclass of`: their values categorise an item.
pub const CATEGORY_PROPERTIES: [&str; 2] = ["P31", "P279"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemDetail {
    pub qid: String,
    pub label: String,
    pub aliases: Vec<String>,
    pub description: String,
    pub url: String,
    #[serde(flatten)]
    pub statements: Option<ItemStatements>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemStatements {
    pub claims: Vec<ParsedClaim>,
    pub external_links: Vec<ParsedClaim>,
    pub categories: Vec<StatementValue>,
    /// Property details fetched for every claim pid.
    pub properties: Vec<Row>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedClaim {
    pub pid: String,
    pub label: String,
    pub values: Vec<StatementValue>,
}

/// A main snak value with the statement's first reference and its qualifiers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementValue {
    #[serde(flatten)]
    pub snak: ParsedSnak,
    pub references: Vec<SnakGroup>,
    pub qualifiers: Vec<SnakGroup>,
}

impl Portal {
    /// Fetch and decode an entity; fetch and decode failures are logged and read as absent.
    pub fn fetch_entity(&self, id: &str) -> Option<Entity> {
        let json = match self.knowledge_base().entity_json(id) {
            Ok(Some(json)) => json,
            Ok(None) => {
                tracing::info!(%id, "entity not found");
                return None;
            }
            Err(err) => {
                tracing::error!(%id, error = %err, "failed to read entity");
                return None;
            }
        };
        match Entity::from_json(json) {
            Ok(entity) => Some(entity),
            Err(err) => {
                tracing::error!(%id, error = %err, "malformed entity JSON");
                None
            }
        }
    }

    pub fn item_detail(&self, qid: &str, with_claims: bool) -> Result<Option<ItemDetail>> {
        let Some(entity) = self.fetch_entity(qid) else {
            return Ok(None);
        };
        let langs = self.languages();

        let mut detail = ItemDetail {
            qid: qid.to_string(),
            label: entity
                .label(langs)
                .map(str::to_string)
                .unwrap_or_else(|| format!("Item {qid}")),
            aliases: entity.aliases(langs),
            description: entity.description(langs).unwrap_or_default().to_string(),
            url: format_item_url(qid),
            statements: None,
        };
        if with_claims {
            detail.statements = Some(self.parse_statements(&entity)?);
        }
        Ok(Some(detail))
    }

    fn parse_statements(&self, entity: &Entity) -> Result<ItemStatements> {
        let mut pids: Vec<&String> = entity.claims.keys().collect();
        pids.sort_by_key(|pid| entity_id_to_int(pid).unwrap_or(u64::MAX));

        let queries = self.property_queries();
        let properties = queries.details_by_pids(&pids)?;
        let mut index = PropertyIndex::new(queries);
        index.preload(&properties);
        let mut ctx = SnakContext::new(index, self.knowledge_base());

        let mut claims = Vec::new();
        let mut external_links = Vec::new();
        let mut categories = Vec::new();

        for pid in pids {
            let mut values = Vec::new();
            let mut external = false;
            for statement in &entity.claims[pid] {
                let Some(value) = parse_statement(pid, statement, &mut ctx) else {
                    continue;
                };
                if value.snak.is_external_id() {
                    external = true;
                } else if CATEGORY_PROPERTIES.contains(&pid.as_str()) {
                    categories.push(value.clone());
                }
                values.push(value);
            }

            let claim = ParsedClaim {
                pid: pid.clone(),
                label: ctx.index.label(pid),
                values,
            };
            if external {
                external_links.push(claim);
            } else {
                claims.push(claim);
            }
        }

        Ok(ItemStatements {
            claims,
            external_links,
            categories,
            properties,
        })
    }

    /// Statement count per property, `None` when the item cannot be read.
    pub fn property_counts(&self, qid: &str) -> Option<BTreeMap<String, usize>> {
        self.fetch_entity(qid).map(|entity| entity.property_counts())
    }
}

fn parse_statement(
    pid: &str,
    statement: &Statement,
    ctx: &mut SnakContext<'_>,
) -> Option<StatementValue> {
    let Some(mainsnak) = &statement.mainsnak else {
        tracing::warn!(%pid, "statement without a main snak");
        return None;
    };
    let snak = parse_snak(pid, mainsnak, ctx)?;
    let references = statement
        .first_reference()
        .map(|snaks| parse_snak_set(snaks, ctx))
        .unwrap_or_default();
    let qualifiers = parse_snak_set(&statement.qualifiers, ctx);
    Some(StatementValue {
        snak,
        references,
        qualifiers,
    })
}
