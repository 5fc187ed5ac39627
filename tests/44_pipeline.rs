use anyhow::Result;
use uuid::Uuid;

use tubecast_api::pipeline::{Lookup, ManyLookup, PageParams, Pipeline, SortDirection};

// SQL-level checks for the document pipelines the list endpoints are built
// from. These compile pipelines exactly the way the handlers do and assert
// on the generated statement text and parameter order.

#[test]
fn listing_pipeline_compiles_to_one_paginated_select() -> Result<()> {
    let owner = Uuid::new_v4();
    let query = Pipeline::new("videos")?
        .match_flag("is_published", true)?
        .match_contains("title", "rust")?
        .match_id("owner_id", owner)?
        .sort("created_at", SortDirection::Desc)?
        .lookup(
            Lookup::new("users", "owner_id", "id", "owner")
                .project(&["id", "username", "fullname", "avatar_url"]),
        )?
        .paginate(PageParams::from_query(Some(2), Some(10)))
        .to_sql();

    assert!(query.sql.starts_with("SELECT row_to_json(t) AS doc FROM ("));
    assert!(query.sql.contains("LEFT JOIN \"users\" AS \"owner\""));
    assert!(query.sql.contains("ORDER BY"));
    assert!(query.sql.contains("LIMIT 10 OFFSET 10"));
    // The published flag is inlined; only the needle and owner id bind
    assert_eq!(query.params.len(), 2);
    Ok(())
}

#[test]
fn count_runs_over_the_same_predicate_without_joins() -> Result<()> {
    let pipeline = Pipeline::new("comments")?
        .match_id("video_id", Uuid::new_v4())?
        .lookup(Lookup::new("users", "owner_id", "id", "owner").project(&["id", "username"]))?;

    let docs = pipeline.to_sql();
    let count = pipeline.to_count_sql();

    assert!(count.sql.starts_with("SELECT COUNT(*) AS count FROM \"comments\""));
    assert!(!count.sql.contains("LEFT JOIN"));
    assert!(count.sql.contains("WHERE"));
    // Identical predicate means identical bound parameters
    assert_eq!(
        docs.params.last(),
        count.params.first(),
        "match parameter must be shared between the two statements"
    );
    Ok(())
}

#[test]
fn channel_profile_counts_bind_before_match_params() -> Result<()> {
    let viewer = Uuid::new_v4();
    let query = Pipeline::new("users")?
        .project(&["id", "username", "fullname", "avatar_url", "cover_image_url"])?
        .match_eq("username", "ana")?
        .count_of("subscriptions", "channel_id", "subscribers_count")?
        .count_of("subscriptions", "subscriber_id", "subscribed_to_count")?
        .exists_of("subscriptions", "channel_id", "subscriber_id", viewer, "is_subscribed")?
        .to_sql();

    // SELECT-position parameters come first, the WHERE match last
    assert_eq!(query.params.len(), 2);
    assert_eq!(query.params[0], serde_json::json!(viewer.to_string()));
    assert_eq!(query.params[1], serde_json::json!("ana"));
    assert!(query.sql.contains("COUNT(*)"));
    assert!(query.sql.contains("EXISTS"));
    Ok(())
}

#[test]
fn liked_videos_pipeline_nests_the_owner_join() -> Result<()> {
    let user = Uuid::new_v4();
    let query = Pipeline::new("likes")?
        .match_id("liked_by", user)?
        .match_not_null("video_id")?
        .sort("created_at", SortDirection::Desc)?
        .lookup(
            Lookup::new("videos", "video_id", "id", "video")
                .project(&["id", "title", "thumbnail_url", "duration", "views"])
                .nested(
                    Lookup::new("users", "owner_id", "id", "owner")
                        .project(&["id", "username", "avatar_url"]),
                ),
        )?
        .to_sql();

    assert!(query.sql.contains("\"video_id\" IS NOT NULL"));
    assert!(query.sql.contains("LEFT JOIN \"videos\" AS \"video\""));
    assert!(query.sql.contains("\"video__owner\""));
    Ok(())
}

#[test]
fn playlist_videos_aggregate_in_list_order() -> Result<()> {
    let query = Pipeline::new("playlists")?
        .match_id("id", Uuid::new_v4())?
        .lookup_many(
            ManyLookup::new("playlist_videos", "playlist_id", "video_id", "videos", "videos")
                .project(&["id", "title", "thumbnail_url"])
                .order_by("position"),
        )?
        .to_sql();

    assert!(query.sql.contains("json_agg"));
    assert!(query.sql.contains("ORDER BY"));
    assert!(query.sql.contains("'[]'::json"));
    Ok(())
}

#[test]
fn contains_stage_escapes_like_wildcards() -> Result<()> {
    let query = Pipeline::new("videos")?
        .match_contains("title", "100%_rust\\")?
        .to_sql();

    assert!(query.sql.contains("ILIKE"));
    assert_eq!(query.params.len(), 1);
    let bound = query.params[0].as_str().unwrap_or_default();
    assert!(bound.contains("\\%"));
    assert!(bound.contains("\\_"));
    assert!(bound.contains("\\\\"));
    Ok(())
}

#[test]
fn hostile_identifiers_never_reach_the_sql() {
    assert!(Pipeline::new("videos; DROP TABLE users").is_err());
    let pipeline = Pipeline::new("videos").and_then(|p| p.sort("created_at, 1", SortDirection::Asc));
    assert!(pipeline.is_err());
}

#[test]
fn unpaginated_pipeline_has_no_limit_clause() -> Result<()> {
    let query = Pipeline::new("videos")?.to_sql();
    assert!(!query.sql.contains("LIMIT"));
    Ok(())
}
