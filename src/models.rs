use crate::schema;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

/// Full user row. Not `Serialize` on purpose: `password_hash` must never reach
/// a response body. Handlers project into response structs instead.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = schema::users)]
pub struct User {
    pub uid: i32,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub profile_picture: Option<String>,
    pub bio: Option<String>,
    pub gender: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// For inserting a user. `uid` comes from the DB sequence, `created_at` from its default.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::users)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = schema::posts)]
pub struct Post {
    pub id: i64,
    pub caption: String,
    pub image_url: String,
    pub author_uid: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::posts)]
pub struct NewPost {
    pub id: i64,
    pub caption: String,
    pub image_url: String,
    pub author_uid: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::post_likes)]
pub struct PostLike {
    pub post_id: i64,
    pub uid: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = schema::comments)]
pub struct Comment {
    pub id: i64,
    pub body: String,
    pub author_uid: i32,
    pub post_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::comments)]
pub struct NewComment {
    pub id: i64,
    pub body: String,
    pub author_uid: i32,
    pub post_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::bookmarks)]
pub struct Bookmark {
    pub uid: i32,
    pub post_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = schema::follows)]
pub struct Follow {
    pub follower_uid: i32,
    pub followee_uid: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = schema::messages)]
pub struct Message {
    pub id: i64,
    pub sender_uid: i32,
    pub receiver_uid: i32,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = schema::messages)]
pub struct NewMessage {
    pub id: i64,
    pub sender_uid: i32,
    pub receiver_uid: i32,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
