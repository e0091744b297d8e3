use std::collections::{BTreeSet, HashMap};

use libsql::{params, Connection};

use crate::error::Result;
use crate::models::{Tag, TagKind, TagSearchOperator, TagWeight};

use super::placeholders;

pub struct TagRepository;

impl TagRepository {
    /// Intern a set of tag names: return existing rows plus newly created
    /// ones. A UNIQUE collision (another writer got there first) falls back
    /// to a plain lookup — never recurses.
    pub async fn get_or_create(
        conn: &Connection,
        names: &[String],
        kind: TagKind,
    ) -> Result<Vec<Tag>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let mut tags = Self::get_by_names(conn, names).await?;
        let existing: BTreeSet<&str> = tags.iter().map(|t| t.name.as_str()).collect();
        let missing: Vec<&String> = names
            .iter()
            .filter(|n| !existing.contains(n.as_str()))
            .collect();

        for name in missing {
            let inserted = conn
                .execute(
                    "INSERT INTO t_tags (name, type) VALUES (?1, ?2)",
                    params![name.clone(), kind.to_string()],
                )
                .await;

            match inserted {
                Ok(_) => tags.push(Tag {
                    id: conn.last_insert_rowid(),
                    name: name.clone(),
                    kind,
                }),
                Err(error) => {
                    if error.to_string().contains("UNIQUE") {
                        if let Some(tag) =
                            Self::get_by_names(conn, &[name.clone()]).await?.pop()
                        {
                            tags.push(tag);
                        }
                    } else {
                        return Err(error.into());
                    }
                }
            }
        }

        Ok(tags)
    }

    pub async fn get_by_names(conn: &Connection, names: &[String]) -> Result<Vec<Tag>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, name, type FROM t_tags WHERE name IN ({})",
            placeholders(names.len(), 1)
        );
        let values: Vec<libsql::Value> = names
            .iter()
            .map(|n| libsql::Value::from(n.clone()))
            .collect();

        let mut rows = conn.query(&sql, libsql::params_from_iter(values)).await?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next().await? {
            tags.push(Self::from_row(&row)?);
        }
        Ok(tags)
    }

    pub async fn get_by_ids(conn: &Connection, ids: &[i64]) -> Result<Vec<Tag>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, name, type FROM t_tags WHERE id IN ({}) ORDER BY id",
            placeholders(ids.len(), 1)
        );
        let values: Vec<libsql::Value> = ids.iter().map(|id| libsql::Value::from(*id)).collect();

        let mut rows = conn.query(&sql, libsql::params_from_iter(values)).await?;
        let mut tags = Vec::new();
        while let Some(row) = rows.next().await? {
            tags.push(Self::from_row(&row)?);
        }
        Ok(tags)
    }

    pub async fn get_all_names(conn: &Connection) -> Result<Vec<String>> {
        let mut rows = conn
            .query("SELECT name FROM t_tags ORDER BY name", ())
            .await?;
        let mut names = Vec::new();
        while let Some(row) = rows.next().await? {
            names.push(row.get(0)?);
        }
        Ok(names)
    }

    /// Union `tag_ids` into the file's sorted display CSV and rewrite the
    /// FTS mirror inside the same transaction, so the two can never drift.
    pub async fn link_to_file(conn: &Connection, file_id: i64, tag_ids: &[i64]) -> Result<()> {
        if tag_ids.is_empty() {
            return Ok(());
        }

        let tx = conn.transaction().await?;

        let mut rows = tx
            .query(
                "SELECT tags_display_ids FROM t_file_screening WHERE id = ?1",
                params![file_id],
            )
            .await?;
        let existing_csv: Option<String> = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => {
                return Err(crate::error::KfError::NotFound(format!(
                    "Screening row {file_id} not found"
                )))
            }
        };

        let mut all_ids: BTreeSet<i64> = existing_csv
            .as_deref()
            .unwrap_or("")
            .split(',')
            .filter_map(|t| t.trim().parse::<i64>().ok())
            .collect();
        all_ids.extend(tag_ids.iter().copied());

        let csv = all_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let fts = all_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(" ");

        tx.execute(
            "UPDATE t_file_screening SET tags_display_ids = ?2 WHERE id = ?1",
            params![file_id, csv],
        )
        .await?;
        tx.execute(
            "DELETE FROM t_files_fts WHERE file_id = ?1",
            params![file_id],
        )
        .await?;
        tx.execute(
            "INSERT INTO t_files_fts (file_id, tags_search_ids) VALUES (?1, ?2)",
            params![file_id, fts],
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// FTS MATCH over the inverted index, e.g. `"3 AND 17"`.
    pub async fn search_file_ids(
        conn: &Connection,
        tag_ids: &[i64],
        operator: TagSearchOperator,
    ) -> Result<Vec<i64>> {
        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }

        let match_expr = tag_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(operator.as_fts_join());

        let mut rows = conn
            .query(
                "SELECT file_id FROM t_files_fts WHERE tags_search_ids MATCH ?1",
                params![match_expr],
            )
            .await?;

        let mut file_ids = Vec::new();
        while let Some(row) = rows.next().await? {
            file_ids.push(row.get(0)?);
        }
        Ok(file_ids)
    }

    /// Frequency-weighted tag list for the tag cloud.
    pub async fn tag_cloud(
        conn: &Connection,
        limit: usize,
        min_weight: u64,
    ) -> Result<Vec<TagWeight>> {
        let mut rows = conn
            .query(
                "SELECT tags_display_ids FROM t_file_screening \
                 WHERE tags_display_ids IS NOT NULL AND tags_display_ids != ''",
                (),
            )
            .await?;

        let mut frequency: HashMap<i64, u64> = HashMap::new();
        while let Some(row) = rows.next().await? {
            let csv: String = row.get(0)?;
            for part in csv.split(',') {
                if let Ok(id) = part.trim().parse::<i64>() {
                    *frequency.entry(id).or_insert(0) += 1;
                }
            }
        }

        let mut weighted: Vec<(i64, u64)> = frequency
            .into_iter()
            .filter(|(_, w)| *w >= min_weight)
            .collect();
        weighted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        weighted.truncate(limit);

        let ids: Vec<i64> = weighted.iter().map(|(id, _)| *id).collect();
        let weights: HashMap<i64, u64> = weighted.into_iter().collect();
        let tags = Self::get_by_ids(conn, &ids).await?;

        let mut cloud: Vec<TagWeight> = tags
            .into_iter()
            .map(|t| TagWeight {
                weight: weights.get(&t.id).copied().unwrap_or(0),
                id: t.id,
                name: t.name,
                kind: t.kind,
            })
            .collect();
        cloud.sort_by(|a, b| b.weight.cmp(&a.weight).then(a.id.cmp(&b.id)));
        Ok(cloud)
    }

    fn from_row(row: &libsql::Row) -> Result<Tag> {
        let kind: String = row.get(2)?;
        Ok(Tag {
            id: row.get(0)?,
            name: row.get(1)?,
            kind: kind.parse().unwrap_or(TagKind::Llm),
        })
    }
}
