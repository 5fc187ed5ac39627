use serde_json::Value;
use sqlx::{postgres::PgArguments, PgPool, Row};
use uuid::Uuid;

use super::error::PipelineError;
use super::page::{Page, PageParams};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Parse the caller-supplied sort direction. Anything other than an
    /// explicit request for descending order sorts ascending.
    pub fn from_query(raw: Option<&str>) -> Self {
        match raw {
            Some(s) if s.eq_ignore_ascii_case("desc") => SortDirection::Desc,
            _ => SortDirection::Asc,
        }
    }

    fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// A join of one related row into a named JSON field of each result
/// document, carrying its own column projection. One level of nesting is
/// supported for the "video joined with its owner" shape.
#[derive(Debug, Clone)]
pub struct Lookup {
    from: String,
    local_field: String,
    foreign_field: String,
    as_field: String,
    project: Vec<String>,
    nested: Option<Box<Lookup>>,
}

impl Lookup {
    pub fn new(
        from: impl Into<String>,
        local_field: impl Into<String>,
        foreign_field: impl Into<String>,
        as_field: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            local_field: local_field.into(),
            foreign_field: foreign_field.into(),
            as_field: as_field.into(),
            project: vec![],
            nested: None,
        }
    }

    pub fn project(mut self, columns: &[&str]) -> Self {
        self.project = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Nest a further lookup whose `local_field` lives on this lookup's
    /// joined table.
    pub fn nested(mut self, lookup: Lookup) -> Self {
        self.nested = Some(Box::new(lookup));
        self
    }

    fn validate(&self) -> Result<(), PipelineError> {
        validate_identifier(&self.from)?;
        validate_identifier(&self.local_field)?;
        validate_identifier(&self.foreign_field)?;
        validate_identifier(&self.as_field)?;
        if self.project.is_empty() {
            return Err(PipelineError::EmptyLookupProjection(self.as_field.clone()));
        }
        for col in &self.project {
            validate_identifier(col)?;
        }
        if let Some(nested) = &self.nested {
            nested.validate()?;
            if nested.nested.is_some() {
                return Err(PipelineError::InvalidIdentifier(
                    "lookups nest at most one level".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// A one-to-many join through a link table, aggregated into a JSON array
/// field ordered by a column on the link table. Each element may nest one
/// further single-row lookup (video → owner).
#[derive(Debug, Clone)]
pub struct ManyLookup {
    through: String,
    through_local: String,
    through_foreign: String,
    from: String,
    as_field: String,
    project: Vec<String>,
    order_by: Option<String>,
    nested: Option<Box<Lookup>>,
}

impl ManyLookup {
    pub fn new(
        through: impl Into<String>,
        through_local: impl Into<String>,
        through_foreign: impl Into<String>,
        from: impl Into<String>,
        as_field: impl Into<String>,
    ) -> Self {
        Self {
            through: through.into(),
            through_local: through_local.into(),
            through_foreign: through_foreign.into(),
            from: from.into(),
            as_field: as_field.into(),
            project: vec![],
            order_by: None,
            nested: None,
        }
    }

    pub fn project(mut self, columns: &[&str]) -> Self {
        self.project = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Order the aggregated array by a column on the link table.
    pub fn order_by(mut self, column: impl Into<String>) -> Self {
        self.order_by = Some(column.into());
        self
    }

    pub fn nested(mut self, lookup: Lookup) -> Self {
        self.nested = Some(Box::new(lookup));
        self
    }

    fn validate(&self) -> Result<(), PipelineError> {
        for name in [
            &self.through,
            &self.through_local,
            &self.through_foreign,
            &self.from,
            &self.as_field,
        ] {
            validate_identifier(name)?;
        }
        if self.project.is_empty() {
            return Err(PipelineError::EmptyLookupProjection(self.as_field.clone()));
        }
        for col in &self.project {
            validate_identifier(col)?;
        }
        if let Some(order) = &self.order_by {
            validate_identifier(order)?;
        }
        if let Some(nested) = &self.nested {
            nested.validate()?;
            if nested.nested.is_some() {
                return Err(PipelineError::InvalidIdentifier(
                    "lookups nest at most one level".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum MatchStage {
    Eq { column: String, value: Value, cast: Option<&'static str> },
    Ne { column: String, value: Value },
    Flag { column: String, value: bool },
    Contains { column: String, needle: String },
    NotNull { column: String },
}

#[derive(Debug, Clone)]
enum Computed {
    /// Correlated `COUNT(*)` of rows in `from` whose `foreign_field` equals
    /// the primary row's id.
    Count {
        from: String,
        foreign_field: String,
        as_field: String,
    },
    /// Correlated `EXISTS` membership check, additionally matching
    /// `match_field` against a bound parameter.
    Exists {
        from: String,
        foreign_field: String,
        match_field: String,
        match_value: Uuid,
        as_field: String,
    },
}

/// The pipeline builder: match → sort → lookup → project → paginate over a
/// primary collection, compiled to one parameterized SELECT plus a count
/// statement over the same match predicate.
#[derive(Debug, Clone)]
pub struct Pipeline {
    collection: String,
    projected: Vec<String>,
    matches: Vec<MatchStage>,
    sort: Vec<(String, SortDirection)>,
    lookups: Vec<Lookup>,
    many_lookups: Vec<ManyLookup>,
    computed: Vec<Computed>,
    page: Option<PageParams>,
}

/// Compiled SQL plus bind parameters in placeholder order.
#[derive(Debug)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Pipeline {
    pub fn new(collection: impl Into<String>) -> Result<Self, PipelineError> {
        let collection = collection.into();
        validate_identifier(&collection)?;
        Ok(Self {
            collection,
            projected: vec![],
            matches: vec![],
            sort: vec![],
            lookups: vec![],
            many_lookups: vec![],
            computed: vec![],
            page: None,
        })
    }

    /// Restrict the primary columns included in each document. Without this
    /// stage every column of the collection is projected.
    pub fn project(mut self, columns: &[&str]) -> Result<Self, PipelineError> {
        for col in columns {
            validate_identifier(col)?;
        }
        self.projected = columns.iter().map(|c| c.to_string()).collect();
        Ok(self)
    }

    pub fn match_eq(mut self, column: &str, value: impl Into<Value>) -> Result<Self, PipelineError> {
        validate_identifier(column)?;
        self.matches.push(MatchStage::Eq {
            column: column.to_string(),
            value: value.into(),
            cast: None,
        });
        Ok(self)
    }

    pub fn match_ne(mut self, column: &str, value: impl Into<Value>) -> Result<Self, PipelineError> {
        validate_identifier(column)?;
        self.matches.push(MatchStage::Ne { column: column.to_string(), value: value.into() });
        Ok(self)
    }

    /// Equality match against a uuid column. Ids travel as strings in the
    /// params vec, so only this stage carries the explicit `::uuid` cast;
    /// text columns compare uncast even when a value happens to look like a
    /// uuid.
    pub fn match_id(mut self, column: &str, id: Uuid) -> Result<Self, PipelineError> {
        validate_identifier(column)?;
        self.matches.push(MatchStage::Eq {
            column: column.to_string(),
            value: Value::String(id.to_string()),
            cast: Some("::uuid"),
        });
        Ok(self)
    }

    pub fn match_flag(mut self, column: &str, value: bool) -> Result<Self, PipelineError> {
        validate_identifier(column)?;
        self.matches.push(MatchStage::Flag { column: column.to_string(), value });
        Ok(self)
    }

    /// Case-insensitive substring match; the needle is escaped so `%`, `_`
    /// and `\` in user input match literally.
    pub fn match_contains(mut self, column: &str, needle: &str) -> Result<Self, PipelineError> {
        validate_identifier(column)?;
        self.matches.push(MatchStage::Contains {
            column: column.to_string(),
            needle: needle.to_string(),
        });
        Ok(self)
    }

    pub fn match_not_null(mut self, column: &str) -> Result<Self, PipelineError> {
        validate_identifier(column)?;
        self.matches.push(MatchStage::NotNull { column: column.to_string() });
        Ok(self)
    }

    pub fn sort(mut self, column: &str, direction: SortDirection) -> Result<Self, PipelineError> {
        validate_identifier(column)?;
        self.sort.push((column.to_string(), direction));
        Ok(self)
    }

    pub fn lookup(mut self, lookup: Lookup) -> Result<Self, PipelineError> {
        lookup.validate()?;
        self.lookups.push(lookup);
        Ok(self)
    }

    pub fn lookup_many(mut self, lookup: ManyLookup) -> Result<Self, PipelineError> {
        lookup.validate()?;
        self.many_lookups.push(lookup);
        Ok(self)
    }

    pub fn count_of(
        mut self,
        from: &str,
        foreign_field: &str,
        as_field: &str,
    ) -> Result<Self, PipelineError> {
        validate_identifier(from)?;
        validate_identifier(foreign_field)?;
        validate_identifier(as_field)?;
        self.computed.push(Computed::Count {
            from: from.to_string(),
            foreign_field: foreign_field.to_string(),
            as_field: as_field.to_string(),
        });
        Ok(self)
    }

    pub fn exists_of(
        mut self,
        from: &str,
        foreign_field: &str,
        match_field: &str,
        match_value: Uuid,
        as_field: &str,
    ) -> Result<Self, PipelineError> {
        validate_identifier(from)?;
        validate_identifier(foreign_field)?;
        validate_identifier(match_field)?;
        validate_identifier(as_field)?;
        self.computed.push(Computed::Exists {
            from: from.to_string(),
            foreign_field: foreign_field.to_string(),
            match_field: match_field.to_string(),
            match_value,
            as_field: as_field.to_string(),
        });
        Ok(self)
    }

    pub fn paginate(mut self, params: PageParams) -> Self {
        self.page = Some(params);
        self
    }

    /// Compile to the document-producing SELECT. Each row is a single `doc`
    /// column holding the JSON document.
    pub fn to_sql(&self) -> SqlQuery {
        let mut params: Vec<Value> = vec![];

        let mut select_parts: Vec<String> = vec![];
        if self.projected.is_empty() {
            select_parts.push(format!("{}.*", quote(&self.collection)));
        } else {
            for col in &self.projected {
                select_parts.push(format!("{}.{}", quote(&self.collection), quote(col)));
            }
        }

        let mut join_parts: Vec<String> = vec![];
        for lookup in &self.lookups {
            select_parts.push(self.lookup_select(lookup));
            join_parts.push(self.lookup_join(lookup));
        }

        for lookup in &self.many_lookups {
            select_parts.push(self.many_lookup_select(lookup));
        }

        for computed in &self.computed {
            select_parts.push(self.computed_select(computed, &mut params));
        }

        let where_clause = self.where_sql(&mut params);
        let order_clause = self.order_sql();
        let limit_clause = match &self.page {
            Some(p) => format!("LIMIT {} OFFSET {}", p.limit(), p.offset()),
            None => String::new(),
        };

        let inner = [
            format!("SELECT {}", select_parts.join(", ")),
            format!("FROM {}", quote(&self.collection)),
            join_parts.join(" "),
            where_clause,
            order_clause,
            limit_clause,
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        SqlQuery {
            sql: format!("SELECT row_to_json(t) AS doc FROM ({}) t", inner),
            params,
        }
    }

    /// Compile the count statement over the same match predicate. Lookups
    /// are LEFT joins used only for projection, so they never change the
    /// count and are omitted here.
    pub fn to_count_sql(&self) -> SqlQuery {
        let mut params: Vec<Value> = vec![];
        let where_clause = self.where_sql(&mut params);
        let sql = [
            format!("SELECT COUNT(*) AS count FROM {}", quote(&self.collection)),
            where_clause,
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
        SqlQuery { sql, params }
    }

    /// Execute the pipeline and return one page of documents together with
    /// totals computed over the same predicate.
    pub async fn fetch_page(&self, pool: &PgPool) -> Result<Page<Value>, PipelineError> {
        let params = self.page.unwrap_or_default();
        // An unpaginated pipeline still pages with the defaults
        let paginated = self.clone().paginate(params);

        let count_query = paginated.to_count_sql();
        let count_row = bind_all(sqlx::query(&count_query.sql), &count_query.params)
            .fetch_one(pool)
            .await?;
        let total_docs: i64 = count_row.try_get("count")?;

        let docs = paginated.fetch_docs(pool).await?;
        Ok(Page::new(docs, total_docs, params))
    }

    /// Execute without pagination bookkeeping and return the raw documents.
    pub async fn fetch_docs(&self, pool: &PgPool) -> Result<Vec<Value>, PipelineError> {
        let query = self.to_sql();
        let rows = bind_all(sqlx::query(&query.sql), &query.params)
            .fetch_all(pool)
            .await?;
        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            docs.push(row.try_get::<Value, _>("doc")?);
        }
        Ok(docs)
    }

    /// Execute and return the first document, if any.
    pub async fn fetch_optional(&self, pool: &PgPool) -> Result<Option<Value>, PipelineError> {
        let query = self.to_sql();
        let row = bind_all(sqlx::query(&query.sql), &query.params)
            .fetch_optional(pool)
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get::<Value, _>("doc")?)),
            None => Ok(None),
        }
    }

    fn lookup_select(&self, lookup: &Lookup) -> String {
        let alias = lookup.as_field.as_str();
        let object = lookup_object(lookup, alias);
        // A missed LEFT JOIN yields NULL for the field instead of an object
        // full of NULL members.
        format!(
            "CASE WHEN {}.{} IS NULL THEN NULL ELSE {} END AS {}",
            quote(alias),
            quote(&lookup.foreign_field),
            object,
            quote(alias)
        )
    }

    fn lookup_join(&self, lookup: &Lookup) -> String {
        let alias = lookup.as_field.as_str();
        let mut sql = format!(
            "LEFT JOIN {} AS {} ON {}.{} = {}.{}",
            quote(&lookup.from),
            quote(alias),
            quote(alias),
            quote(&lookup.foreign_field),
            quote(&self.collection),
            quote(&lookup.local_field),
        );
        if let Some(nested) = &lookup.nested {
            let nested_alias = nested_alias_for(lookup, nested);
            sql.push_str(&format!(
                " LEFT JOIN {} AS {} ON {}.{} = {}.{}",
                quote(&nested.from),
                quote(&nested_alias),
                quote(&nested_alias),
                quote(&nested.foreign_field),
                quote(alias),
                quote(&nested.local_field),
            ));
        }
        sql
    }

    fn many_lookup_select(&self, lookup: &ManyLookup) -> String {
        let mut pairs: Vec<String> = lookup
            .project
            .iter()
            .map(|col| format!("'{}', {}.{}", col, quote(&lookup.from), quote(col)))
            .collect();

        let mut nested_join = String::new();
        if let Some(nested) = &lookup.nested {
            let alias = format!("{}__{}", lookup.as_field, nested.as_field);
            let nested_pairs: Vec<String> = nested
                .project
                .iter()
                .map(|col| format!("'{}', {}.{}", col, quote(&alias), quote(col)))
                .collect();
            pairs.push(format!(
                "'{}', CASE WHEN {}.{} IS NULL THEN NULL ELSE json_build_object({}) END",
                nested.as_field,
                quote(&alias),
                quote(&nested.foreign_field),
                nested_pairs.join(", ")
            ));
            nested_join = format!(
                " LEFT JOIN {} AS {} ON {}.{} = {}.{}",
                quote(&nested.from),
                quote(&alias),
                quote(&alias),
                quote(&nested.foreign_field),
                quote(&lookup.from),
                quote(&nested.local_field),
            );
        }

        let order = match &lookup.order_by {
            Some(col) => format!(" ORDER BY {}.{}", quote(&lookup.through), quote(col)),
            None => String::new(),
        };

        format!(
            "(SELECT COALESCE(json_agg(json_build_object({pairs}){order}), '[]'::json) \
             FROM {through} JOIN {from} ON {from}.id = {through}.{tf}{nested_join} \
             WHERE {through}.{tl} = {primary}.id) AS {a}",
            pairs = pairs.join(", "),
            order = order,
            through = quote(&lookup.through),
            from = quote(&lookup.from),
            tf = quote(&lookup.through_foreign),
            nested_join = nested_join,
            tl = quote(&lookup.through_local),
            primary = quote(&self.collection),
            a = quote(&lookup.as_field),
        )
    }

    fn computed_select(&self, computed: &Computed, params: &mut Vec<Value>) -> String {
        match computed {
            Computed::Count { from, foreign_field, as_field } => format!(
                "(SELECT COUNT(*) FROM {f} WHERE {f}.{ff} = {c}.id) AS {a}",
                f = quote(from),
                ff = quote(foreign_field),
                c = quote(&self.collection),
                a = quote(as_field),
            ),
            Computed::Exists { from, foreign_field, match_field, match_value, as_field } => {
                params.push(Value::String(match_value.to_string()));
                format!(
                    "EXISTS(SELECT 1 FROM {f} WHERE {f}.{ff} = {c}.id AND {f}.{mf} = ${n}::uuid) AS {a}",
                    f = quote(from),
                    ff = quote(foreign_field),
                    c = quote(&self.collection),
                    mf = quote(match_field),
                    n = params.len(),
                    a = quote(as_field),
                )
            }
        }
    }

    fn where_sql(&self, params: &mut Vec<Value>) -> String {
        if self.matches.is_empty() {
            return String::new();
        }
        let mut conditions = Vec::with_capacity(self.matches.len());
        for stage in &self.matches {
            match stage {
                MatchStage::Eq { column, value, cast } => {
                    params.push(value.clone());
                    conditions.push(format!(
                        "{}.{} = ${}{}",
                        quote(&self.collection),
                        quote(column),
                        params.len(),
                        cast.unwrap_or("")
                    ));
                }
                MatchStage::Ne { column, value } => {
                    params.push(value.clone());
                    conditions.push(format!(
                        "{}.{} <> ${}",
                        quote(&self.collection),
                        quote(column),
                        params.len()
                    ));
                }
                MatchStage::Flag { column, value } => {
                    conditions.push(format!(
                        "{}.{} = {}",
                        quote(&self.collection),
                        quote(column),
                        value
                    ));
                }
                MatchStage::Contains { column, needle } => {
                    params.push(Value::String(format!("%{}%", escape_like(needle))));
                    conditions.push(format!(
                        "{}.{} ILIKE ${}",
                        quote(&self.collection),
                        quote(column),
                        params.len()
                    ));
                }
                MatchStage::NotNull { column } => {
                    conditions.push(format!(
                        "{}.{} IS NOT NULL",
                        quote(&self.collection),
                        quote(column)
                    ));
                }
            }
        }
        format!("WHERE {}", conditions.join(" AND "))
    }

    fn order_sql(&self) -> String {
        if self.sort.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = self
            .sort
            .iter()
            .map(|(col, dir)| {
                format!("{}.{} {}", quote(&self.collection), quote(col), dir.sql())
            })
            .collect();
        format!("ORDER BY {}", parts.join(", "))
    }
}

fn lookup_object(lookup: &Lookup, alias: &str) -> String {
    let mut pairs: Vec<String> = lookup
        .project
        .iter()
        .map(|col| format!("'{}', {}.{}", col, quote(alias), quote(col)))
        .collect();
    if let Some(nested) = &lookup.nested {
        let nested_alias = nested_alias_for(lookup, nested);
        let nested_pairs: Vec<String> = nested
            .project
            .iter()
            .map(|col| format!("'{}', {}.{}", col, quote(&nested_alias), quote(col)))
            .collect();
        pairs.push(format!(
            "'{}', CASE WHEN {}.{} IS NULL THEN NULL ELSE json_build_object({}) END",
            nested.as_field,
            quote(&nested_alias),
            quote(&nested.foreign_field),
            nested_pairs.join(", ")
        ));
    }
    format!("json_build_object({})", pairs.join(", "))
}

fn nested_alias_for(parent: &Lookup, nested: &Lookup) -> String {
    format!("{}__{}", parent.as_field, nested.as_field)
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier)
}

fn validate_identifier(name: &str) -> Result<(), PipelineError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(PipelineError::InvalidIdentifier(name.to_string()))
    }
}

/// Escape LIKE metacharacters so user input matches literally. Postgres uses
/// backslash as the default escape character.
fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn bind_all<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    params: &'q [Value],
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    for value in params {
        query = bind_param(query, value);
    }
    query
}

fn bind_param<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    v: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s),
        other => q.bind(other.clone()), // JSONB
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_pipeline_selects_everything() {
        let q = Pipeline::new("videos").unwrap().to_sql();
        assert_eq!(
            q.sql,
            "SELECT row_to_json(t) AS doc FROM (SELECT \"videos\".* FROM \"videos\") t"
        );
        assert!(q.params.is_empty());
    }

    #[test]
    fn match_sort_paginate_compose_in_order() {
        let q = Pipeline::new("videos")
            .unwrap()
            .match_contains("title", "rust")
            .unwrap()
            .match_flag("is_published", true)
            .unwrap()
            .sort("created_at", SortDirection::Desc)
            .unwrap()
            .paginate(PageParams::from_query(Some(2), Some(10)))
            .to_sql();
        assert!(q.sql.contains("WHERE \"videos\".\"title\" ILIKE $1 AND \"videos\".\"is_published\" = true"));
        assert!(q.sql.contains("ORDER BY \"videos\".\"created_at\" DESC"));
        assert!(q.sql.ends_with("LIMIT 10 OFFSET 10) t"));
        assert_eq!(q.params, vec![Value::String("%rust%".to_string())]);
    }

    #[test]
    fn like_needle_is_escaped() {
        let q = Pipeline::new("videos")
            .unwrap()
            .match_contains("title", "100%_done\\")
            .unwrap()
            .to_sql();
        assert_eq!(
            q.params[0],
            Value::String("%100\\%\\_done\\\\%".to_string())
        );
    }

    #[test]
    fn lookup_projects_joined_row_as_json_object() {
        let q = Pipeline::new("videos")
            .unwrap()
            .lookup(
                Lookup::new("users", "owner_id", "id", "owner")
                    .project(&["id", "username", "avatar_url"]),
            )
            .unwrap()
            .to_sql();
        assert!(q.sql.contains(
            "LEFT JOIN \"users\" AS \"owner\" ON \"owner\".\"id\" = \"videos\".\"owner_id\""
        ));
        assert!(q.sql.contains("json_build_object('id', \"owner\".\"id\", 'username', \"owner\".\"username\", 'avatar_url', \"owner\".\"avatar_url\")"));
        assert!(q.sql.contains("CASE WHEN \"owner\".\"id\" IS NULL THEN NULL ELSE"));
    }

    #[test]
    fn nested_lookup_joins_through_parent() {
        let q = Pipeline::new("watch_history")
            .unwrap()
            .lookup(
                Lookup::new("videos", "video_id", "id", "video")
                    .project(&["id", "title"])
                    .nested(
                        Lookup::new("users", "owner_id", "id", "owner")
                            .project(&["username", "avatar_url"]),
                    ),
            )
            .unwrap()
            .to_sql();
        assert!(q.sql.contains(
            "LEFT JOIN \"users\" AS \"video__owner\" ON \"video__owner\".\"id\" = \"video\".\"owner_id\""
        ));
        assert!(q.sql.contains("'owner', CASE WHEN \"video__owner\".\"id\" IS NULL"));
    }

    #[test]
    fn count_sql_shares_the_match_predicate() {
        let uid = Uuid::new_v4();
        let pipeline = Pipeline::new("comments")
            .unwrap()
            .match_id("video_id", uid)
            .unwrap()
            .lookup(Lookup::new("users", "owner_id", "id", "owner").project(&["username"]))
            .unwrap()
            .sort("created_at", SortDirection::Asc)
            .unwrap()
            .paginate(PageParams::default());
        let count = pipeline.to_count_sql();
        assert_eq!(
            count.sql,
            "SELECT COUNT(*) AS count FROM \"comments\" WHERE \"comments\".\"video_id\" = $1::uuid"
        );
        assert_eq!(count.params, vec![Value::String(uid.to_string())]);
        // Sorting, joins and pagination never change the total
        assert!(!count.sql.contains("JOIN"));
        assert!(!count.sql.contains("LIMIT"));
    }

    #[test]
    fn computed_params_precede_match_params() {
        let requester = Uuid::new_v4();
        let channel = "ana";
        let q = Pipeline::new("users")
            .unwrap()
            .match_eq("username", channel)
            .unwrap()
            .count_of("subscriptions", "channel_id", "subscribers_count")
            .unwrap()
            .exists_of("subscriptions", "channel_id", "subscriber_id", requester, "is_subscribed")
            .unwrap()
            .to_sql();
        // SELECT-position placeholders are numbered before WHERE-position ones
        assert!(q.sql.contains("\"subscriber_id\" = $1::uuid"));
        assert!(q.sql.contains("\"users\".\"username\" = $2"));
        assert_eq!(q.params.len(), 2);
        assert_eq!(q.params[0], Value::String(requester.to_string()));
        assert_eq!(q.params[1], Value::String(channel.to_string()));
    }

    #[test]
    fn uuid_shaped_text_compares_uncast() {
        // A username that happens to parse as a uuid still compares as text
        let q = Pipeline::new("users")
            .unwrap()
            .match_eq("username", "550e8400-e29b-41d4-a716-446655440000")
            .unwrap()
            .to_sql();
        assert!(q.sql.contains("\"users\".\"username\" = $1"));
        assert!(!q.sql.contains("::uuid"));
    }

    #[test]
    fn id_match_casts_the_parameter() {
        let q = Pipeline::new("videos")
            .unwrap()
            .match_id("owner_id", Uuid::new_v4())
            .unwrap()
            .to_sql();
        assert!(q.sql.contains("\"videos\".\"owner_id\" = $1::uuid"));
    }

    #[test]
    fn projection_restricts_primary_columns() {
        let q = Pipeline::new("users")
            .unwrap()
            .project(&["username", "fullname", "avatar_url"])
            .unwrap()
            .to_sql();
        assert!(q.sql.contains("SELECT \"users\".\"username\", \"users\".\"fullname\", \"users\".\"avatar_url\" FROM"));
        assert!(!q.sql.contains("\"users\".*"));
    }

    #[test]
    fn hostile_identifiers_are_rejected() {
        assert!(Pipeline::new("videos; DROP TABLE users").is_err());
        assert!(Pipeline::new("videos")
            .unwrap()
            .match_eq("title\" OR 1=1 --", "x")
            .is_err());
        assert!(Pipeline::new("videos")
            .unwrap()
            .sort("created_at) --", SortDirection::Asc)
            .is_err());
        assert!(Pipeline::new("1videos").is_err());
        assert!(Pipeline::new("").is_err());
    }

    #[test]
    fn many_lookup_aggregates_ordered_array() {
        let q = Pipeline::new("playlists")
            .unwrap()
            .lookup_many(
                ManyLookup::new("playlist_videos", "playlist_id", "video_id", "videos", "videos")
                    .project(&["id", "title", "thumbnail_url"])
                    .order_by("position")
                    .nested(
                        Lookup::new("users", "owner_id", "id", "owner")
                            .project(&["username", "avatar_url"]),
                    ),
            )
            .unwrap()
            .to_sql();
        assert!(q.sql.contains("COALESCE(json_agg(json_build_object("));
        assert!(q.sql.contains("ORDER BY \"playlist_videos\".\"position\""));
        assert!(q.sql.contains(
            "FROM \"playlist_videos\" JOIN \"videos\" ON \"videos\".id = \"playlist_videos\".\"video_id\""
        ));
        assert!(q.sql.contains("WHERE \"playlist_videos\".\"playlist_id\" = \"playlists\".id) AS \"videos\""));
        assert!(q.sql.contains("LEFT JOIN \"users\" AS \"videos__owner\""));
    }

    #[test]
    fn lookup_requires_a_projection() {
        let err = Pipeline::new("videos")
            .unwrap()
            .lookup(Lookup::new("users", "owner_id", "id", "owner"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptyLookupProjection(_)));
    }
}
