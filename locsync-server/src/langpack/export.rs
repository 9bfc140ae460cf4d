//! Language-pack export (pull)
//!
//! Rebuilds documents from the catalog in canonical key order so repeated
//! exports are byte-stable, and derives an ETag from catalog freshness for
//! conditional fetches.

use crate::db::{entries, template, translations};
use crate::error::{ApiError, ApiResult};
use locsync_common::db::models::Project;
use locsync_common::keypath::{canonical_order, nest_document, DocumentShape};
use ring::digest;
use serde_json::{Map, Value};
use sqlx::SqlitePool;
use std::collections::HashMap;

/// A rendered export: one document per requested locale, plus the ETag
/// covering all of them.
#[derive(Debug, Clone)]
pub struct ExportResult {
    pub etag: String,
    /// (locale, document) in request order
    pub documents: Vec<(String, Value)>,
}

/// Export documents for the requested locales.
///
/// For the source locale each entry emits its source text; for a target
/// locale, the translation text when non-blank, else the source text —
/// incomplete translations degrade to the source language rather than
/// surfacing blanks.
pub async fn export(
    db: &SqlitePool,
    project: &Project,
    locales: &[String],
) -> ApiResult<ExportResult> {
    for locale in locales {
        let known = *locale == project.source_locale
            || project.target_locales.iter().any(|l| l == locale);
        if !known {
            return Err(ApiError::NotFound(format!(
                "Locale '{}' is not configured for this project",
                locale
            )));
        }
    }

    // (key, guid, source_text) sorted by key
    let catalog = entries::list_for_project(db, &project.guid).await?;
    let keys: Vec<String> = catalog.iter().map(|(k, _, _)| k.clone()).collect();
    let by_key: HashMap<&str, (&str, &str)> = catalog
        .iter()
        .map(|(k, g, s)| (k.as_str(), (g.as_str(), s.as_str())))
        .collect();
    let template_keys = template::list_ordered(db, &project.guid).await?;
    let ordered = canonical_order(&template_keys, &keys);

    let mut documents = Vec::with_capacity(locales.len());
    for locale in locales {
        let texts = if *locale == project.source_locale {
            None
        } else {
            Some(translations::texts_for_locale(db, &project.guid, locale).await?)
        };

        let mut pairs = Vec::with_capacity(ordered.len());
        for key in &ordered {
            // canonical_order only emits keys present in the catalog
            let Some((guid, source_text)) = by_key.get(key.as_str()).copied() else {
                continue;
            };

            let text = match &texts {
                None => source_text.to_string(),
                Some(map) => match map.get(guid) {
                    Some(Some(t)) if !t.trim().is_empty() => t.clone(),
                    _ => source_text.to_string(),
                },
            };
            pairs.push((key.clone(), text));
        }

        let document = match project.shape {
            DocumentShape::Flat => {
                let mut map = Map::new();
                for (key, text) in pairs {
                    map.insert(key, Value::String(text));
                }
                Value::Object(map)
            }
            DocumentShape::Tree => nest_document(&pairs),
        };
        documents.push((locale.clone(), document));
    }

    let etag = derive_etag(db, project, locales).await?;

    Ok(ExportResult { etag, documents })
}

/// Derive the export version tag from the maximum of the latest entry
/// update and the latest translation update for the requested locales.
/// Identical catalog state always yields an identical tag.
pub async fn derive_etag(
    db: &SqlitePool,
    project: &Project,
    locales: &[String],
) -> ApiResult<String> {
    let latest_entry = entries::latest_updated_at(db, &project.guid).await?;

    let target_locales: Vec<String> = locales
        .iter()
        .filter(|l| **l != project.source_locale)
        .cloned()
        .collect();
    let latest_translation =
        translations::latest_updated_at(db, &project.guid, &target_locales).await?;

    let fingerprint = format!(
        "{}|{}|{}|{}",
        project.guid,
        locales.join(","),
        latest_entry.unwrap_or_default(),
        latest_translation.unwrap_or_default(),
    );

    let hash = digest::digest(&digest::SHA256, fingerprint.as_bytes());
    let hex: String = hash.as_ref().iter().map(|b| format!("{:02x}", b)).collect();
    Ok(format!("\"{}\"", hex))
}
