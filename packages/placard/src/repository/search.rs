use async_trait::async_trait;
use sqlx::Row;
use tracing::debug;

use placard_core::error::Result;
use placard_core::search::{SearchHits, SearchIndex, SearchQuery};

use super::sql::{Bind, bind_all, criteria_clause, decode_doc};
use super::{Collection, InventoryRepository, backend};

fn to_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl InventoryRepository {
    /// Words of a raw phrase with everything but word characters stripped.
    fn fts_tokens(raw: &str) -> Vec<String> {
        raw.split_whitespace()
            .map(|word| {
                word.chars()
                    .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '\''))
                    .collect::<String>()
            })
            .filter(|s| !s.is_empty())
            .collect()
    }

    // Quote every token so user input can never be parsed as FTS5 syntax.
    pub(crate) fn escape_fts_query(raw: &str) -> String {
        Self::fts_tokens(raw)
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Name-restricted query whose last token matches as a prefix.
    pub(crate) fn prefix_fts_query(raw: &str) -> String {
        let tokens = Self::fts_tokens(raw);
        let last = tokens.len().saturating_sub(1);
        tokens
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let star = if i == last { "*" } else { "" };
                format!("name : \"{}\"{}", t, star)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Empty-phrase fallback: every row the filter admits, by name then id.
    async fn browse<E: Collection>(&self, query: &SearchQuery) -> Result<SearchHits<E>> {
        let clause = criteria_clause::<E>(&query.filter)?;

        let count_sql = format!(
            "SELECT COUNT(*) AS total FROM {} t WHERE {}",
            E::TABLE,
            clause.sql
        );
        let total: i64 = bind_all(sqlx::query(&count_sql), &clause.binds)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?
            .try_get("total")
            .map_err(backend)?;

        let sql = format!(
            "SELECT t.doc FROM {} t WHERE {} ORDER BY t.name ASC, t.id ASC LIMIT ? OFFSET ?",
            E::TABLE,
            clause.sql
        );
        let rows = bind_all(sqlx::query(&sql), &clause.binds)
            .bind(to_i64(query.limit))
            .bind(to_i64(query.offset))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        let hits = rows
            .iter()
            .map(|row| decode_doc::<E>(row.get::<&str, _>("doc")))
            .collect::<Result<Vec<E>>>()?;
        Ok(SearchHits {
            hits,
            total: total as u64,
        })
    }

    /// BM25-ranked FTS5 match joined back to the document table.
    async fn ranked<E: Collection>(
        &self,
        expression: String,
        query: &SearchQuery,
    ) -> Result<SearchHits<E>> {
        let clause = criteria_clause::<E>(&query.filter)?;
        let mut binds = vec![Bind::Text(expression)];
        binds.extend(clause.binds);

        let from = format!(
            "FROM {fts} fts JOIN {table} t ON t.rowid = fts.rowid WHERE {fts} MATCH ? AND {}",
            clause.sql,
            fts = E::FTS_TABLE,
            table = E::TABLE,
        );

        let count_sql = format!("SELECT COUNT(*) AS total {from}");
        let total: i64 = bind_all(sqlx::query(&count_sql), &binds)
            .fetch_one(&self.pool)
            .await
            .map_err(backend)?
            .try_get("total")
            .map_err(backend)?;

        let sql = format!("SELECT t.doc {from} ORDER BY fts.rank, t.name, t.id LIMIT ? OFFSET ?");
        let rows = bind_all(sqlx::query(&sql), &binds)
            .bind(to_i64(query.limit))
            .bind(to_i64(query.offset))
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        let hits = rows
            .iter()
            .map(|row| decode_doc::<E>(row.get::<&str, _>("doc")))
            .collect::<Result<Vec<E>>>()?;
        Ok(SearchHits {
            hits,
            total: total as u64,
        })
    }
}

#[async_trait]
impl<E: Collection> SearchIndex<E> for InventoryRepository {
    async fn search(&self, query: &SearchQuery) -> Result<SearchHits<E>> {
        if query.phrase.trim().is_empty() {
            return self.browse(query).await;
        }
        let expression = Self::escape_fts_query(&query.phrase);
        if expression.is_empty() {
            return Ok(SearchHits::empty());
        }
        debug!(table = E::FTS_TABLE, %expression, "search");
        self.ranked(expression, query).await
    }

    async fn autocomplete(&self, query: &SearchQuery) -> Result<SearchHits<E>> {
        if query.phrase.trim().is_empty() {
            return self.browse(query).await;
        }
        let expression = Self::prefix_fts_query(&query.phrase);
        if expression.is_empty() {
            return Ok(SearchHits::empty());
        }
        debug!(table = E::FTS_TABLE, %expression, "autocomplete");
        self.ranked(expression, query).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::repository::test_helpers::test_repository;
    use placard_core::connection::{Page, Pagination, PaginationArgs, PaginationLimits};
    use placard_core::entity::{LifecycleTransition, PlacementInput, Record};
    use placard_core::search as adapter;
    use placard_core::{Criteria, Entity, EntityStore, Placement};

    #[test]
    fn test_escape_fts_query_basic() {
        assert_eq!(
            InventoryRepository::escape_fts_query("hello world"),
            "\"hello\" \"world\""
        );
    }

    #[test]
    fn test_escape_fts_query_special_chars() {
        assert_eq!(
            InventoryRepository::escape_fts_query("hello@world!test"),
            "\"helloworldtest\""
        );
    }

    #[test]
    fn test_escape_fts_query_operators_are_quoted() {
        assert_eq!(
            InventoryRepository::escape_fts_query("AND OR NOT NEAR"),
            "\"AND\" \"OR\" \"NOT\" \"NEAR\""
        );
    }

    #[test]
    fn test_escape_fts_query_injection_attempt() {
        assert_eq!(
            InventoryRepository::escape_fts_query("test\" OR \"hack"),
            "\"test\" \"OR\" \"hack\""
        );
    }

    #[test]
    fn test_escape_fts_query_unicode() {
        assert_eq!(
            InventoryRepository::escape_fts_query("café résumé"),
            "\"café\" \"résumé\""
        );
    }

    #[test]
    fn test_escape_fts_query_empty() {
        assert_eq!(InventoryRepository::escape_fts_query(""), "");
        assert_eq!(InventoryRepository::escape_fts_query("!@#$%"), "");
    }

    #[test]
    fn test_prefix_fts_query() {
        assert_eq!(
            InventoryRepository::prefix_fts_query("home lea"),
            "name : \"home\" name : \"lea\"*"
        );
        assert_eq!(InventoryRepository::prefix_fts_query("  "), "");
    }

    #[test]
    fn test_prefix_fts_query_star_lands_on_last_surviving_token() {
        // A trailing punctuation-only word is dropped, so "home" becomes the prefix.
        assert_eq!(
            InventoryRepository::prefix_fts_query("home !!!"),
            "name : \"home\"*"
        );
        assert_eq!(InventoryRepository::prefix_fts_query("!!! ???"), "");
    }

    #[test]
    fn test_prefix_fts_query_single_token_is_a_prefix() {
        assert_eq!(
            InventoryRepository::prefix_fts_query("lead"),
            "name : \"lead\"*"
        );
    }

    #[test]
    fn test_prefix_fts_query_column_filter_cannot_be_escaped() {
        // Quotes and colons are stripped, so input cannot retarget the `body` column.
        assert_eq!(
            InventoryRepository::prefix_fts_query("body:\"pub\" x*"),
            "name : \"bodypub\" name : \"x\"*"
        );
    }

    fn query(phrase: &str, filter: Criteria) -> SearchQuery {
        SearchQuery {
            phrase: phrase.to_string(),
            filter,
            offset: 0,
            limit: 10,
        }
    }

    fn names(hits: &SearchHits<Placement>) -> Vec<&str> {
        hits.hits.iter().map(|p| p.name.as_str()).collect()
    }

    async fn seeded() -> InventoryRepository {
        let repo = test_repository().await;
        for (id, name, publisher) in [
            ("1", "Homepage Leaderboard", "pub-1"),
            ("2", "Homepage Sidebar", "pub-1"),
            ("3", "Article Footer", "pub-1"),
            ("4", "Homepage Homepage Takeover", "pub-1"),
            ("5", "Newsletter Banner", "pub-2"),
        ] {
            let p = Placement::from_draft(
                Record::new(Utc::now()).with_id(id),
                PlacementInput {
                    name: Some(name.into()),
                    publisher_id: Some(publisher.into()),
                    template_id: Some("tpl".into()),
                    ..Default::default()
                },
            )
            .unwrap();
            EntityStore::<Placement>::save(&repo, p).await.unwrap();
        }
        repo
    }

    #[tokio::test]
    async fn search_ranks_by_relevance() {
        let repo = seeded().await;
        let hits: SearchHits<Placement> = repo
            .search(&query("homepage", Criteria::active()))
            .await
            .unwrap();
        assert_eq!(hits.total, 3);
        assert_eq!(hits.hits[0].name, "Homepage Homepage Takeover");
    }

    #[tokio::test]
    async fn search_applies_offset_and_limit() {
        let repo = seeded().await;
        let mut q = query("homepage", Criteria::active());
        q.offset = 1;
        q.limit = 1;
        let hits: SearchHits<Placement> = repo.search(&q).await.unwrap();
        assert_eq!(hits.hits.len(), 1);
        assert_eq!(hits.total, 3);
    }

    #[tokio::test]
    async fn autocomplete_matches_name_prefix() {
        let repo = seeded().await;
        let hits: SearchHits<Placement> = repo
            .autocomplete(&query("news", Criteria::active()))
            .await
            .unwrap();
        assert_eq!(names(&hits), vec!["Newsletter Banner"]);

        let hits: SearchHits<Placement> = repo
            .autocomplete(&query("homepage lead", Criteria::active()))
            .await
            .unwrap();
        assert_eq!(names(&hits), vec!["Homepage Leaderboard"]);
    }

    #[tokio::test]
    async fn empty_phrase_browses_by_name() {
        let repo = seeded().await;
        let hits: SearchHits<Placement> = repo
            .autocomplete(&query("", Criteria::active()))
            .await
            .unwrap();
        assert_eq!(hits.total, 5);
        assert_eq!(hits.hits[0].name, "Article Footer");
        assert_eq!(hits.hits[4].name, "Newsletter Banner");
    }

    #[tokio::test]
    async fn punctuation_only_phrase_matches_nothing() {
        let repo = seeded().await;
        let hits: SearchHits<Placement> = repo
            .search(&query("!!!", Criteria::active()))
            .await
            .unwrap();
        assert!(hits.hits.is_empty());
        assert_eq!(hits.total, 0);
    }

    #[tokio::test]
    async fn operator_injection_is_inert() {
        let repo = seeded().await;
        let hits: SearchHits<Placement> = repo
            .search(&query("homepage\" OR \"footer", Criteria::active()))
            .await
            .unwrap();
        assert_eq!(hits.total, 0);
    }

    #[tokio::test]
    async fn filter_and_soft_delete_apply_to_hits() {
        let repo = seeded().await;
        let hits: SearchHits<Placement> = repo
            .search(&query("banner", Criteria::active().with("publisher_id", "pub-1")))
            .await
            .unwrap();
        assert!(hits.hits.is_empty());

        let mut sidebar: Placement = repo.find_strict_active_by_id(&"2".into()).await.unwrap();
        sidebar
            .record
            .transition(LifecycleTransition::Delete, Utc::now())
            .unwrap();
        EntityStore::<Placement>::save(&repo, sidebar).await.unwrap();

        let hits: SearchHits<Placement> = repo
            .search(&query("sidebar", Criteria::active()))
            .await
            .unwrap();
        assert_eq!(hits.total, 0);

        let hits: SearchHits<Placement> = repo
            .search(&query("sidebar", Criteria::any_state()))
            .await
            .unwrap();
        assert_eq!(hits.total, 1);
        assert!(hits.hits[0].is_deleted());
    }

    #[tokio::test]
    async fn search_matches_referenced_ids_but_autocomplete_does_not() {
        let repo = seeded().await;
        let hits: SearchHits<Placement> = repo
            .search(&query("pub-2", Criteria::active()))
            .await
            .unwrap();
        assert_eq!(names(&hits), vec!["Newsletter Banner"]);

        let hits: SearchHits<Placement> = repo
            .autocomplete(&query("pub", Criteria::active()))
            .await
            .unwrap();
        assert_eq!(hits.total, 0);
    }

    fn pages(args: PaginationArgs) -> Pagination {
        Pagination::from_args(args, &PaginationLimits::default()).unwrap()
    }

    fn page_names(page: &Page<Placement>) -> Vec<String> {
        page.nodes.iter().map(|p| p.name.clone()).collect()
    }

    #[tokio::test]
    async fn search_cursors_page_forward_over_sqlite() {
        let repo = seeded().await;
        let filter = Criteria::active();

        let first: Page<Placement> =
            adapter::search(&repo, "homepage", &filter, &pages(PaginationArgs::first(2)), true)
                .await
                .unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first.total_count, Some(3));
        assert!(first.page_info.has_next_page);
        assert!(!first.page_info.has_previous_page);
        assert_eq!(first.nodes[0].name, "Homepage Homepage Takeover");

        let second: Page<Placement> = adapter::search(
            &repo,
            "homepage",
            &filter,
            &pages(PaginationArgs::first(2).after(first.page_info.end_cursor.clone())),
            false,
        )
        .await
        .unwrap();
        assert_eq!(second.len(), 1);
        assert!(!second.page_info.has_next_page);
        assert!(second.page_info.has_previous_page);

        let mut all = page_names(&first);
        all.extend(page_names(&second));
        all.sort();
        assert_eq!(
            all,
            vec![
                "Homepage Homepage Takeover",
                "Homepage Leaderboard",
                "Homepage Sidebar"
            ]
        );
    }

    #[tokio::test]
    async fn search_cursors_page_backward_from_the_tail_over_sqlite() {
        let repo = seeded().await;
        let filter = Criteria::active();

        let tail: Page<Placement> =
            adapter::search(&repo, "homepage", &filter, &pages(PaginationArgs::last(2)), false)
                .await
                .unwrap();
        assert_eq!(tail.len(), 2);
        assert!(tail.page_info.has_previous_page);
        assert!(!tail.page_info.has_next_page);

        let head: Page<Placement> = adapter::search(
            &repo,
            "homepage",
            &filter,
            &pages(PaginationArgs::last(2).before(tail.page_info.start_cursor.clone())),
            false,
        )
        .await
        .unwrap();
        assert_eq!(head.len(), 1);
        assert!(!head.page_info.has_previous_page);
        assert!(head.page_info.has_next_page);
        assert_eq!(head.nodes[0].name, "Homepage Homepage Takeover");

        let mut all = page_names(&head);
        all.extend(page_names(&tail));
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn autocomplete_cursors_page_over_sqlite() {
        let repo = seeded().await;
        let filter = Criteria::active();

        let first: Page<Placement> =
            adapter::autocomplete(&repo, "home", &filter, &pages(PaginationArgs::first(1)), true)
                .await
                .unwrap();
        assert_eq!(first.total_count, Some(3));
        assert!(first.page_info.has_next_page);

        let rest: Page<Placement> = adapter::autocomplete(
            &repo,
            "home",
            &filter,
            &pages(PaginationArgs::first(5).after(first.page_info.end_cursor.clone())),
            false,
        )
        .await
        .unwrap();
        assert_eq!(rest.len(), 2);
        assert!(!rest.page_info.has_next_page);
        assert!(!page_names(&rest).contains(&first.nodes[0].name));
    }
}
