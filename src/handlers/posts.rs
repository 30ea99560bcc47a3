use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use std::collections::HashMap;

use crate::events::{Notification, NotificationKind, ServerEvent, UserDetails};
use crate::models::{Bookmark, Comment, NewComment, NewPost, Post, PostLike};
use crate::presence::PresenceRegistry;
use crate::schema::{bookmarks, comments, post_likes, posts, users};
use crate::utils::auth::CurrentUid;
use crate::utils::{ids, media};
use crate::AppState;

use super::ApiMessage;

#[derive(serde::Deserialize)]
pub struct PostIdPath {
    id: i64,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AuthorBrief {
    pub uid: i32,
    pub username: String,
    pub profile_picture: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    #[serde(with = "crate::utils::id_string")]
    pub id: i64,
    pub text: String,
    pub author: AuthorBrief,
    #[serde(with = "crate::utils::id_string")]
    pub post_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    #[serde(with = "crate::utils::id_string")]
    pub id: i64,
    pub caption: String,
    pub image: String,
    pub author: AuthorBrief,
    /// Uids of users who liked the post.
    pub likes: Vec<i32>,
    pub comments: Vec<CommentResponse>,
    pub created_at: DateTime<Utc>,
}

pub(crate) enum PostFilter {
    All,
    ByAuthor(i32),
    ByIds(Vec<i64>),
}

/// Load posts newest-first with author, likes, and comments populated.
pub(crate) fn load_posts(
    conn: &mut diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<diesel::PgConnection>>,
    filter: PostFilter,
) -> Result<Vec<PostResponse>, diesel::result::Error> {
    let mut query = posts::table
        .inner_join(users::table)
        .order(posts::id.desc())
        .select((
            Post::as_select(),
            (users::uid, users::username, users::profile_picture),
        ))
        .into_boxed();
    match filter {
        PostFilter::All => {}
        PostFilter::ByAuthor(uid) => query = query.filter(posts::author_uid.eq(uid)),
        PostFilter::ByIds(ids) => query = query.filter(posts::id.eq_any(ids)),
    }
    let rows: Vec<(Post, (i32, String, Option<String>))> = query.load(conn)?;

    let post_ids: Vec<i64> = rows.iter().map(|(p, _)| p.id).collect();

    let mut likes_by_post: HashMap<i64, Vec<i32>> = HashMap::new();
    if !post_ids.is_empty() {
        let likes: Vec<(i64, i32)> = post_likes::table
            .filter(post_likes::post_id.eq_any(&post_ids))
            .select((post_likes::post_id, post_likes::uid))
            .load(conn)?;
        for (post_id, uid) in likes {
            likes_by_post.entry(post_id).or_default().push(uid);
        }
    }

    let mut comments_by_post: HashMap<i64, Vec<CommentResponse>> = HashMap::new();
    if !post_ids.is_empty() {
        let comment_rows: Vec<(Comment, (i32, String, Option<String>))> = comments::table
            .inner_join(users::table)
            .filter(comments::post_id.eq_any(&post_ids))
            .order(comments::id.desc())
            .select((
                Comment::as_select(),
                (users::uid, users::username, users::profile_picture),
            ))
            .load(conn)?;
        for (c, (uid, username, profile_picture)) in comment_rows {
            comments_by_post
                .entry(c.post_id)
                .or_default()
                .push(CommentResponse {
                    id: c.id,
                    text: c.body,
                    author: AuthorBrief {
                        uid,
                        username,
                        profile_picture,
                    },
                    post_id: c.post_id,
                    created_at: c.created_at,
                });
        }
    }

    Ok(rows
        .into_iter()
        .map(|(p, (uid, username, profile_picture))| PostResponse {
            id: p.id,
            caption: p.caption,
            image: p.image_url,
            author: AuthorBrief {
                uid,
                username,
                profile_picture,
            },
            likes: likes_by_post.remove(&p.id).unwrap_or_default(),
            comments: comments_by_post.remove(&p.id).unwrap_or_default(),
            created_at: p.created_at,
        })
        .collect())
}

fn author_brief(
    conn: &mut diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<diesel::PgConnection>>,
    uid: i32,
) -> Result<UserDetails, diesel::result::Error> {
    let (username, profile_picture): (String, Option<String>) = users::table
        .find(uid)
        .select((users::username, users::profile_picture))
        .first(conn)?;
    Ok(UserDetails {
        username,
        profile_picture,
    })
}

/// Push a like/dislike notification to the post owner. Activity on one's own
/// post never notifies.
fn notify_post_owner(
    registry: &PresenceRegistry,
    kind: NotificationKind,
    owner_uid: i32,
    actor_uid: i32,
    actor: UserDetails,
    post_id: i64,
) {
    if owner_uid == actor_uid {
        return;
    }
    registry.push_to_user(
        owner_uid,
        &ServerEvent::Notification(Notification {
            kind,
            user_id: actor_uid,
            user_details: actor,
            post_id: Some(post_id),
        }),
    );
}

#[derive(Serialize)]
pub struct AddPostResponse {
    success: bool,
    message: &'static str,
    post: PostResponse,
}

/// POST /api/v1/post/addpost — multipart caption + image; image is re-encoded
/// and stored before the row is created.
pub async fn add_post(
    CurrentUid(uid): CurrentUid,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, &'static str)> {
    let mut caption = String::new();
    let mut image: Option<Vec<u8>> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| (StatusCode::BAD_REQUEST, "Malformed multipart body"))?
    {
        match field.name() {
            Some("caption") => {
                caption = field
                    .text()
                    .await
                    .map_err(|_| (StatusCode::BAD_REQUEST, "Malformed multipart body"))?;
            }
            Some("image") => {
                image = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|_| (StatusCode::BAD_REQUEST, "Malformed multipart body"))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    let Some(image) = image else {
        return Err((StatusCode::BAD_REQUEST, "Image required"));
    };

    let optimized = media::optimize_image(&image).map_err(|e| {
        tracing::debug!("optimize image: {:?}", e);
        (StatusCode::BAD_REQUEST, "Unreadable image")
    })?;
    let image_url = state.media.store_jpeg("posts", optimized).await.map_err(|e| {
        tracing::error!("store post image: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Image upload failed")
    })?;

    let id = ids::next_id(state.id_gen.as_ref()).await.map_err(|e| {
        tracing::error!("ferroid next_id: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "ID generation failed")
    })?;
    let now = Utc::now();

    let conn = &mut state
        .db
        .get()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed"))?;

    let new_post = NewPost {
        id,
        caption: caption.trim().to_string(),
        image_url,
        author_uid: uid,
        created_at: now,
    };
    diesel::insert_into(posts::table)
        .values(&new_post)
        .execute(conn)
        .map_err(|e| {
            tracing::error!("insert post: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to add post")
        })?;

    let author = users::table
        .find(uid)
        .select((users::uid, users::username, users::profile_picture))
        .first::<(i32, String, Option<String>)>(conn)
        .map_err(|e| {
            tracing::error!("load post author: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to add post")
        })?;

    Ok((
        StatusCode::CREATED,
        Json(AddPostResponse {
            success: true,
            message: "New post added",
            post: PostResponse {
                id,
                caption: new_post.caption,
                image: new_post.image_url,
                author: AuthorBrief {
                    uid: author.0,
                    username: author.1,
                    profile_picture: author.2,
                },
                likes: vec![],
                comments: vec![],
                created_at: now,
            },
        }),
    ))
}

#[derive(Serialize)]
pub struct PostsResponse {
    success: bool,
    posts: Vec<PostResponse>,
}

/// GET /api/v1/post/all — the feed, newest first.
pub async fn get_all_posts(
    CurrentUid(_uid): CurrentUid,
    State(state): State<AppState>,
) -> Result<Json<PostsResponse>, (StatusCode, &'static str)> {
    let conn = &mut state
        .db
        .get()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed"))?;
    let posts = load_posts(conn, PostFilter::All).map_err(|e| {
        tracing::error!("list posts: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list posts")
    })?;
    Ok(Json(PostsResponse {
        success: true,
        posts,
    }))
}

/// GET /api/v1/post/userpost/all — the caller's own posts.
pub async fn get_user_posts(
    CurrentUid(uid): CurrentUid,
    State(state): State<AppState>,
) -> Result<Json<PostsResponse>, (StatusCode, &'static str)> {
    let conn = &mut state
        .db
        .get()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed"))?;
    let posts = load_posts(conn, PostFilter::ByAuthor(uid)).map_err(|e| {
        tracing::error!("list user posts: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list posts")
    })?;
    Ok(Json(PostsResponse {
        success: true,
        posts,
    }))
}

/// GET /api/v1/post/{id}/like
pub async fn like_post(
    CurrentUid(uid): CurrentUid,
    State(state): State<AppState>,
    Path(PostIdPath { id }): Path<PostIdPath>,
) -> Result<Json<ApiMessage>, (StatusCode, &'static str)> {
    let conn = &mut state
        .db
        .get()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed"))?;

    let post: Post = posts::table
        .find(id)
        .select(Post::as_select())
        .first(conn)
        .optional()
        .map_err(|e| {
            tracing::error!("load post: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        })?
        .ok_or((StatusCode::NOT_FOUND, "Post not found"))?;

    let already: i64 = post_likes::table
        .filter(post_likes::post_id.eq(id).and(post_likes::uid.eq(uid)))
        .count()
        .get_result(conn)
        .map_err(|e| {
            tracing::error!("check like: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        })?;
    if already > 0 {
        return Err((StatusCode::BAD_REQUEST, "Already liked"));
    }

    diesel::insert_into(post_likes::table)
        .values(&PostLike {
            post_id: id,
            uid,
            created_at: Utc::now(),
        })
        .execute(conn)
        .map_err(|e| {
            tracing::error!("insert like: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to like post")
        })?;

    // The like is committed; a failed push only costs the live notification.
    match author_brief(conn, uid) {
        Ok(actor) => notify_post_owner(
            &state.presence,
            NotificationKind::Like,
            post.author_uid,
            uid,
            actor,
            id,
        ),
        Err(e) => tracing::error!("load actor for like notification: {:?}", e),
    }

    Ok(Json(ApiMessage::ok("Post liked")))
}

/// GET /api/v1/post/{id}/dislike — remove a like.
pub async fn dislike_post(
    CurrentUid(uid): CurrentUid,
    State(state): State<AppState>,
    Path(PostIdPath { id }): Path<PostIdPath>,
) -> Result<Json<ApiMessage>, (StatusCode, &'static str)> {
    let conn = &mut state
        .db
        .get()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed"))?;

    let post: Post = posts::table
        .find(id)
        .select(Post::as_select())
        .first(conn)
        .optional()
        .map_err(|e| {
            tracing::error!("load post: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        })?
        .ok_or((StatusCode::NOT_FOUND, "Post not found"))?;

    diesel::delete(
        post_likes::table.filter(post_likes::post_id.eq(id).and(post_likes::uid.eq(uid))),
    )
    .execute(conn)
    .map_err(|e| {
        tracing::error!("delete like: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to dislike post")
    })?;

    match author_brief(conn, uid) {
        Ok(actor) => notify_post_owner(
            &state.presence,
            NotificationKind::Dislike,
            post.author_uid,
            uid,
            actor,
            id,
        ),
        Err(e) => tracing::error!("load actor for dislike notification: {:?}", e),
    }

    Ok(Json(ApiMessage::ok("Post disliked")))
}

#[derive(serde::Deserialize)]
pub struct AddCommentBody {
    text: String,
}

#[derive(Serialize)]
pub struct AddCommentResponse {
    success: bool,
    message: &'static str,
    comment: CommentResponse,
}

/// POST /api/v1/post/{id}/comment
pub async fn add_comment(
    CurrentUid(uid): CurrentUid,
    State(state): State<AppState>,
    Path(PostIdPath { id }): Path<PostIdPath>,
    Json(body): Json<AddCommentBody>,
) -> Result<impl IntoResponse, (StatusCode, &'static str)> {
    if body.text.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Text required"));
    }

    let conn = &mut state
        .db
        .get()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed"))?;

    let post_exists: i64 = posts::table
        .filter(posts::id.eq(id))
        .count()
        .get_result(conn)
        .map_err(|e| {
            tracing::error!("check post: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        })?;
    if post_exists == 0 {
        return Err((StatusCode::NOT_FOUND, "Post not found"));
    }

    let comment_id = ids::next_id(state.id_gen.as_ref()).await.map_err(|e| {
        tracing::error!("ferroid next_id: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "ID generation failed")
    })?;
    let now = Utc::now();

    diesel::insert_into(comments::table)
        .values(&NewComment {
            id: comment_id,
            body: body.text.trim().to_string(),
            author_uid: uid,
            post_id: id,
            created_at: now,
        })
        .execute(conn)
        .map_err(|e| {
            tracing::error!("insert comment: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to add comment")
        })?;

    let author = users::table
        .find(uid)
        .select((users::uid, users::username, users::profile_picture))
        .first::<(i32, String, Option<String>)>(conn)
        .map_err(|e| {
            tracing::error!("load comment author: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to add comment")
        })?;

    Ok((
        StatusCode::CREATED,
        Json(AddCommentResponse {
            success: true,
            message: "Comment Added",
            comment: CommentResponse {
                id: comment_id,
                text: body.text.trim().to_string(),
                author: AuthorBrief {
                    uid: author.0,
                    username: author.1,
                    profile_picture: author.2,
                },
                post_id: id,
                created_at: now,
            },
        }),
    ))
}

#[derive(Serialize)]
pub struct CommentsResponse {
    success: bool,
    comments: Vec<CommentResponse>,
}

/// GET /api/v1/post/{id}/comment/all
pub async fn get_comments(
    CurrentUid(_uid): CurrentUid,
    State(state): State<AppState>,
    Path(PostIdPath { id }): Path<PostIdPath>,
) -> Result<Json<CommentsResponse>, (StatusCode, &'static str)> {
    let conn = &mut state
        .db
        .get()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed"))?;

    let rows: Vec<(Comment, (i32, String, Option<String>))> = comments::table
        .inner_join(users::table)
        .filter(comments::post_id.eq(id))
        .order(comments::id.desc())
        .select((
            Comment::as_select(),
            (users::uid, users::username, users::profile_picture),
        ))
        .load(conn)
        .map_err(|e| {
            tracing::error!("list comments: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list comments")
        })?;

    let comments = rows
        .into_iter()
        .map(|(c, (uid, username, profile_picture))| CommentResponse {
            id: c.id,
            text: c.body,
            author: AuthorBrief {
                uid,
                username,
                profile_picture,
            },
            post_id: c.post_id,
            created_at: c.created_at,
        })
        .collect();

    Ok(Json(CommentsResponse {
        success: true,
        comments,
    }))
}

/// DELETE /api/v1/post/delete/{id} — author only; removes dependent rows too.
pub async fn delete_post(
    CurrentUid(uid): CurrentUid,
    State(state): State<AppState>,
    Path(PostIdPath { id }): Path<PostIdPath>,
) -> Result<Json<ApiMessage>, (StatusCode, &'static str)> {
    let conn = &mut state
        .db
        .get()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed"))?;

    let post: Post = posts::table
        .find(id)
        .select(Post::as_select())
        .first(conn)
        .optional()
        .map_err(|e| {
            tracing::error!("load post: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        })?
        .ok_or((StatusCode::NOT_FOUND, "Post not found"))?;

    if post.author_uid != uid {
        return Err((StatusCode::FORBIDDEN, "Unauthorized"));
    }

    conn.transaction::<_, diesel::result::Error, _>(|conn| {
        diesel::delete(comments::table.filter(comments::post_id.eq(id))).execute(conn)?;
        diesel::delete(post_likes::table.filter(post_likes::post_id.eq(id))).execute(conn)?;
        diesel::delete(bookmarks::table.filter(bookmarks::post_id.eq(id))).execute(conn)?;
        diesel::delete(posts::table.find(id)).execute(conn)?;
        Ok(())
    })
    .map_err(|e| {
        tracing::error!("delete post: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to delete post")
    })?;

    Ok(Json(ApiMessage::ok("Post deleted")))
}

#[derive(Serialize)]
pub struct BookmarkResponse {
    success: bool,
    #[serde(rename = "type")]
    kind: &'static str,
    message: &'static str,
}

/// GET /api/v1/post/{id}/bookmark — toggle.
pub async fn bookmark_post(
    CurrentUid(uid): CurrentUid,
    State(state): State<AppState>,
    Path(PostIdPath { id }): Path<PostIdPath>,
) -> Result<Json<BookmarkResponse>, (StatusCode, &'static str)> {
    let conn = &mut state
        .db
        .get()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed"))?;

    let post_exists: i64 = posts::table
        .filter(posts::id.eq(id))
        .count()
        .get_result(conn)
        .map_err(|e| {
            tracing::error!("check post: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        })?;
    if post_exists == 0 {
        return Err((StatusCode::NOT_FOUND, "Post not found"));
    }

    let existing: i64 = bookmarks::table
        .filter(bookmarks::uid.eq(uid).and(bookmarks::post_id.eq(id)))
        .count()
        .get_result(conn)
        .map_err(|e| {
            tracing::error!("check bookmark: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        })?;

    if existing > 0 {
        diesel::delete(
            bookmarks::table.filter(bookmarks::uid.eq(uid).and(bookmarks::post_id.eq(id))),
        )
        .execute(conn)
        .map_err(|e| {
            tracing::error!("delete bookmark: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to update bookmark")
        })?;
        return Ok(Json(BookmarkResponse {
            success: true,
            kind: "unsaved",
            message: "Removed from bookmarks",
        }));
    }

    diesel::insert_into(bookmarks::table)
        .values(&Bookmark {
            uid,
            post_id: id,
            created_at: Utc::now(),
        })
        .execute(conn)
        .map_err(|e| {
            tracing::error!("insert bookmark: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to update bookmark")
        })?;

    Ok(Json(BookmarkResponse {
        success: true,
        kind: "saved",
        message: "Post bookmarked",
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use std::sync::Arc;

    fn registry() -> PresenceRegistry {
        PresenceRegistry::new(Arc::new(Metrics::new().unwrap()))
    }

    fn actor(username: &str) -> UserDetails {
        UserDetails {
            username: username.to_string(),
            profile_picture: None,
        }
    }

    #[tokio::test]
    async fn liking_own_post_pushes_nothing() {
        let reg = registry();
        let (_entry, mut rx) = reg.register(1);

        notify_post_owner(&reg, NotificationKind::Like, 1, 1, actor("ada"), 5);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn liking_someone_elses_post_notifies_the_owner() {
        let reg = registry();
        let (_owner, mut owner_rx) = reg.register(2);
        let (_actor, mut actor_rx) = reg.register(1);

        notify_post_owner(&reg, NotificationKind::Like, 2, 1, actor("ada"), 5);

        let frame = owner_rx.recv().await.unwrap();
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["type"], "notification");
        assert_eq!(v["payload"]["type"], "like");
        assert_eq!(v["payload"]["userId"], 1);
        assert_eq!(v["payload"]["postId"], "5");
        assert!(actor_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn offline_owner_loses_the_notification_silently() {
        let reg = registry();
        notify_post_owner(&reg, NotificationKind::Dislike, 2, 1, actor("ada"), 5);
    }
}
