use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::events::{Notification, NotificationKind, ServerEvent, UserDetails};
use crate::models::{Follow, NewUser, User};
use crate::schema::{bookmarks, follows, users};
use crate::utils::auth::{self, CurrentUid};
use crate::utils::media;
use crate::AppState;

use super::posts::{load_posts, PostFilter, PostResponse};
use super::ApiMessage;

#[derive(Deserialize)]
pub struct UserIdPath {
    id: i32,
}

/// Sanitized user: everything the client may see, never the password hash.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub uid: i32,
    pub username: String,
    pub email: String,
    pub profile_picture: Option<String>,
    pub bio: Option<String>,
    pub gender: Option<String>,
    /// Uids of users following this one.
    pub followers: Vec<i32>,
    /// Uids this user follows.
    pub following: Vec<i32>,
    pub posts: Vec<PostResponse>,
    pub bookmarks: Vec<PostResponse>,
}

type DbConn =
    diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<diesel::PgConnection>>;

fn follow_lists(conn: &mut DbConn, uid: i32) -> Result<(Vec<i32>, Vec<i32>), diesel::result::Error> {
    let followers = follows::table
        .filter(follows::followee_uid.eq(uid))
        .select(follows::follower_uid)
        .load(conn)?;
    let following = follows::table
        .filter(follows::follower_uid.eq(uid))
        .select(follows::followee_uid)
        .load(conn)?;
    Ok((followers, following))
}

fn build_user_response(
    conn: &mut DbConn,
    user: User,
    include_bookmarks: bool,
) -> Result<UserResponse, diesel::result::Error> {
    let (followers, following) = follow_lists(conn, user.uid)?;
    let posts = load_posts(conn, PostFilter::ByAuthor(user.uid))?;
    let bookmarked = if include_bookmarks {
        let ids: Vec<i64> = bookmarks::table
            .filter(bookmarks::uid.eq(user.uid))
            .select(bookmarks::post_id)
            .load(conn)?;
        load_posts(conn, PostFilter::ByIds(ids))?
    } else {
        vec![]
    };
    Ok(UserResponse {
        uid: user.uid,
        username: user.username,
        email: user.email,
        profile_picture: user.profile_picture,
        bio: user.bio,
        gender: user.gender,
        followers,
        following,
        posts,
        bookmarks: bookmarked,
    })
}

#[derive(Deserialize)]
pub struct RegisterBody {
    username: String,
    email: String,
    password: String,
}

/// POST /api/v1/user/register
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, (StatusCode, &'static str)> {
    if body.username.trim().is_empty() || body.email.trim().is_empty() || body.password.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "All fields are required"));
    }

    let conn = &mut state
        .db
        .get()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed"))?;

    let exists: i64 = users::table
        .filter(users::email.eq(body.email.trim()))
        .count()
        .get_result(conn)
        .map_err(|e| {
            tracing::error!("check email: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        })?;
    if exists > 0 {
        return Err((StatusCode::BAD_REQUEST, "Email already exists"));
    }

    let password_hash = auth::hash_password(&body.password).map_err(|e| {
        tracing::error!("hash password: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Server error")
    })?;

    diesel::insert_into(users::table)
        .values(&NewUser {
            username: body.username.trim().to_string(),
            email: body.email.trim().to_string(),
            password_hash,
        })
        .execute(conn)
        .map_err(|e| {
            tracing::error!("insert user: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create account")
        })?;

    Ok((
        StatusCode::CREATED,
        Json(ApiMessage::ok("Account created successfully")),
    ))
}

#[derive(Deserialize)]
pub struct LoginBody {
    email: String,
    password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    success: bool,
    message: String,
    user: UserResponse,
}

/// POST /api/v1/user/login — verifies the password, sets the session cookie,
/// returns the sanitized user with posts populated.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> Result<impl IntoResponse, (StatusCode, &'static str)> {
    if body.email.trim().is_empty() || body.password.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Email and password required"));
    }

    let conn = &mut state
        .db
        .get()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed"))?;

    let user: User = users::table
        .filter(users::email.eq(body.email.trim()))
        .select(User::as_select())
        .first(conn)
        .optional()
        .map_err(|e| {
            tracing::error!("load user: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        })?
        .ok_or((StatusCode::UNAUTHORIZED, "Invalid credentials"))?;

    if !auth::verify_password(&body.password, &user.password_hash) {
        return Err((StatusCode::UNAUTHORIZED, "Invalid credentials"));
    }

    let token = state.jwt.issue(user.uid).map_err(|e| {
        tracing::error!("issue token: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Server error")
    })?;

    let message = format!("Welcome back {}", user.username);
    let user = build_user_response(conn, user, false).map_err(|e| {
        tracing::error!("build login user: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
    })?;

    Ok((
        [(
            header::SET_COOKIE,
            auth::session_cookie(&token, state.config.production),
        )],
        Json(LoginResponse {
            success: true,
            message,
            user,
        }),
    ))
}

/// GET /api/v1/user/logout
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(
            header::SET_COOKIE,
            auth::clear_session_cookie(state.config.production),
        )],
        Json(ApiMessage::ok("Logged out successfully")),
    )
}

#[derive(Serialize)]
pub struct ProfileResponse {
    success: bool,
    user: UserResponse,
}

/// GET /api/v1/user/{id}/profile — posts and bookmarks populated.
pub async fn get_profile(
    CurrentUid(_uid): CurrentUid,
    State(state): State<AppState>,
    Path(UserIdPath { id }): Path<UserIdPath>,
) -> Result<Json<ProfileResponse>, (StatusCode, &'static str)> {
    let conn = &mut state
        .db
        .get()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed"))?;

    let user: User = users::table
        .find(id)
        .select(User::as_select())
        .first(conn)
        .optional()
        .map_err(|e| {
            tracing::error!("load user: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        })?
        .ok_or((StatusCode::NOT_FOUND, "User not found"))?;

    let user = build_user_response(conn, user, true).map_err(|e| {
        tracing::error!("build profile: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
    })?;

    Ok(Json(ProfileResponse {
        success: true,
        user,
    }))
}

#[derive(AsChangeset)]
#[diesel(table_name = crate::schema::users)]
struct ProfileChanges {
    bio: Option<String>,
    gender: Option<String>,
    profile_picture: Option<String>,
}

#[derive(Serialize)]
pub struct EditProfileResponse {
    success: bool,
    message: &'static str,
    user: UserResponse,
}

/// POST /api/v1/user/profile/edit — multipart with optional bio, gender, and
/// profilePhoto fields.
pub async fn edit_profile(
    CurrentUid(uid): CurrentUid,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<EditProfileResponse>, (StatusCode, &'static str)> {
    let mut changes = ProfileChanges {
        bio: None,
        gender: None,
        profile_picture: None,
    };

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| (StatusCode::BAD_REQUEST, "Malformed multipart body"))?
    {
        match field.name() {
            Some("bio") => {
                changes.bio = Some(
                    field
                        .text()
                        .await
                        .map_err(|_| (StatusCode::BAD_REQUEST, "Malformed multipart body"))?,
                );
            }
            Some("gender") => {
                changes.gender = Some(
                    field
                        .text()
                        .await
                        .map_err(|_| (StatusCode::BAD_REQUEST, "Malformed multipart body"))?,
                );
            }
            Some("profilePhoto") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|_| (StatusCode::BAD_REQUEST, "Malformed multipart body"))?;
                let optimized = media::optimize_image(&bytes).map_err(|e| {
                    tracing::debug!("optimize avatar: {:?}", e);
                    (StatusCode::BAD_REQUEST, "Unreadable image")
                })?;
                let url = state
                    .media
                    .store_jpeg("avatars", optimized)
                    .await
                    .map_err(|e| {
                        tracing::error!("store avatar: {:?}", e);
                        (StatusCode::INTERNAL_SERVER_ERROR, "Image upload failed")
                    })?;
                changes.profile_picture = Some(url);
            }
            _ => {}
        }
    }

    let conn = &mut state
        .db
        .get()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed"))?;

    if changes.bio.is_some() || changes.gender.is_some() || changes.profile_picture.is_some() {
        diesel::update(users::table.find(uid))
            .set(&changes)
            .execute(conn)
            .map_err(|e| {
                tracing::error!("update profile: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to update profile")
            })?;
    }

    let user: User = users::table
        .find(uid)
        .select(User::as_select())
        .first(conn)
        .map_err(|e| {
            tracing::error!("load user: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        })?;

    let user = build_user_response(conn, user, false).map_err(|e| {
        tracing::error!("build profile: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
    })?;

    Ok(Json(EditProfileResponse {
        success: true,
        message: "Profile updated successfully",
        user,
    }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedUser {
    uid: i32,
    username: String,
    profile_picture: Option<String>,
    bio: Option<String>,
}

#[derive(Serialize)]
pub struct SuggestedUsersResponse {
    success: bool,
    users: Vec<SuggestedUser>,
}

/// GET /api/v1/user/suggested — everyone except the caller.
pub async fn get_suggested_users(
    CurrentUid(uid): CurrentUid,
    State(state): State<AppState>,
) -> Result<Json<SuggestedUsersResponse>, (StatusCode, &'static str)> {
    let conn = &mut state
        .db
        .get()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed"))?;

    let rows: Vec<(i32, String, Option<String>, Option<String>)> = users::table
        .filter(users::uid.ne(uid))
        .select((
            users::uid,
            users::username,
            users::profile_picture,
            users::bio,
        ))
        .load(conn)
        .map_err(|e| {
            tracing::error!("list suggested users: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to list users")
        })?;

    Ok(Json(SuggestedUsersResponse {
        success: true,
        users: rows
            .into_iter()
            .map(|(uid, username, profile_picture, bio)| SuggestedUser {
                uid,
                username,
                profile_picture,
                bio,
            })
            .collect(),
    }))
}

/// POST /api/v1/user/followorunfollow/{id} — toggle. A new follow pushes a
/// notification to the target; an unfollow pushes nothing.
pub async fn follow_or_unfollow(
    CurrentUid(uid): CurrentUid,
    State(state): State<AppState>,
    Path(UserIdPath { id: target_uid }): Path<UserIdPath>,
) -> Result<Json<ApiMessage>, (StatusCode, &'static str)> {
    if uid == target_uid {
        return Err((StatusCode::BAD_REQUEST, "Cannot follow yourself"));
    }

    let conn = &mut state
        .db
        .get()
        .map_err(|_| (StatusCode::INTERNAL_SERVER_ERROR, "Database connection failed"))?;

    let target_exists: i64 = users::table
        .filter(users::uid.eq(target_uid))
        .count()
        .get_result(conn)
        .map_err(|e| {
            tracing::error!("check target user: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        })?;
    if target_exists == 0 {
        return Err((StatusCode::NOT_FOUND, "User not found"));
    }

    let is_following: i64 = follows::table
        .filter(
            follows::follower_uid
                .eq(uid)
                .and(follows::followee_uid.eq(target_uid)),
        )
        .count()
        .get_result(conn)
        .map_err(|e| {
            tracing::error!("check follow: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        })?;

    if is_following > 0 {
        diesel::delete(
            follows::table.filter(
                follows::follower_uid
                    .eq(uid)
                    .and(follows::followee_uid.eq(target_uid)),
            ),
        )
        .execute(conn)
        .map_err(|e| {
            tracing::error!("delete follow: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to unfollow")
        })?;
        // No notification on unfollow.
        return Ok(Json(ApiMessage::ok("Unfollowed")));
    }

    diesel::insert_into(follows::table)
        .values(&Follow {
            follower_uid: uid,
            followee_uid: target_uid,
            created_at: chrono::Utc::now(),
        })
        .execute(conn)
        .map_err(|e| {
            tracing::error!("insert follow: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to follow")
        })?;

    // The follow is committed; a failed push only costs the live notification.
    let actor: Result<(String, Option<String>), _> = users::table
        .find(uid)
        .select((users::username, users::profile_picture))
        .first(conn);
    match actor {
        Ok((username, profile_picture)) => {
            state.presence.push_to_user(
                target_uid,
                &ServerEvent::Notification(Notification {
                    kind: NotificationKind::Follow,
                    user_id: uid,
                    user_details: UserDetails {
                        username,
                        profile_picture,
                    },
                    post_id: None,
                }),
            );
        }
        Err(e) => tracing::error!("load actor for follow notification: {:?}", e),
    }

    Ok(Json(ApiMessage::ok("Followed")))
}
