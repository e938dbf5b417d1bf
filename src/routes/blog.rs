use std::path::Path;

use askama::Template;
use axum::body::Bytes;
use axum::extract::{Multipart, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use rusqlite::Connection;
use serde::Deserialize;

use crate::db::feed::{self, FeedFilter, FeedPage, Pagination};
use crate::db::models::{Comment, Image, PostSummary, Viewer};
use crate::db::posts::{self, AuthorCheck};
use crate::db::{comments, images, likes, tags};
use crate::error::{AppError, AppResult};
use crate::extractors::{CommentPath, CurrentUser, MaybeUser, PostId};
use crate::state::AppState;
use crate::uploads::{self, image_extension, remove_uploads, save_upload};
use crate::views::{parse_and_format_time, url_escape, Html};

// --- View structs ---

pub struct TagLink {
    pub name: String,
    pub href: String,
}

pub struct PostCard {
    pub id: i64,
    pub title: String,
    pub body_html: String,
    pub username: String,
    pub created: String,
    pub likes: i64,
    pub comments: i64,
    pub user_liked: bool,
    pub tags: Vec<TagLink>,
    pub images: Vec<String>,
    pub can_edit: bool,
}

impl PostCard {
    fn new(post: PostSummary, images: Vec<Image>, viewer: Viewer) -> Self {
        PostCard {
            can_edit: viewer.user_id() == Some(post.author_id),
            id: post.id,
            title: post.title,
            body_html: post.body_html,
            username: post.username,
            created: parse_and_format_time(&post.created),
            likes: post.likes,
            comments: post.comments,
            user_liked: post.user_liked,
            tags: post
                .tags
                .into_iter()
                .map(|name| TagLink {
                    href: format!("/tag/{}", url_escape(&name)),
                    name,
                })
                .collect(),
            images: images.into_iter().map(|image| image.filename).collect(),
        }
    }
}

pub struct CommentView {
    pub id: i64,
    pub comment: String,
    pub username: String,
    pub created: String,
    pub can_delete: bool,
}

impl CommentView {
    fn new(comment: Comment, viewer: Viewer, post_author: i64) -> Self {
        let viewer_id = viewer.user_id();
        CommentView {
            can_delete: viewer_id.is_some()
                && (comment.user_id == viewer_id || viewer_id == Some(post_author)),
            id: comment.id,
            comment: comment.comment,
            username: comment.username.unwrap_or_else(|| "[deleted]".to_string()),
            created: parse_and_format_time(&comment.created),
        }
    }
}

// --- Templates ---

#[derive(Template)]
#[template(path = "pages/index.html")]
pub struct IndexTemplate {
    pub user: Option<String>,
    pub heading: Option<String>,
    pub query: String,
    pub cards: Vec<PostCard>,
    pub pagination: Pagination,
    /// Link prefix that a page number is appended to.
    pub page_base: String,
}

#[derive(Template)]
#[template(path = "pages/post.html")]
pub struct PostTemplate {
    pub user: Option<String>,
    pub card: PostCard,
    pub comments: Vec<CommentView>,
    pub error: Option<String>,
    pub comment_draft: String,
}

#[derive(Template)]
#[template(path = "pages/create.html")]
pub struct CreateTemplate {
    pub user: Option<String>,
    pub error: Option<String>,
    pub title: String,
    pub body: String,
    pub tags: String,
}

#[derive(Template)]
#[template(path = "pages/update.html")]
pub struct UpdateTemplate {
    pub user: Option<String>,
    pub error: Option<String>,
    pub post_id: i64,
    pub title: String,
    pub body: String,
}

// --- Forms ---

/// `?page=` is kept as text so that junk falls back to page 1.
#[derive(Deserialize)]
pub struct PageQuery {
    pub page: Option<String>,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub query: String,
    pub page: Option<String>,
}

fn page_number(raw: Option<&str>) -> i64 {
    raw.and_then(|page| page.trim().parse().ok()).unwrap_or(1)
}

#[derive(Deserialize)]
pub struct PostForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub comment: String,
}

/// The fields of the multipart create form.
#[derive(Default)]
struct NewPost {
    title: String,
    body: String,
    tags: String,
    images: Vec<(String, Bytes)>,
}

impl NewPost {
    async fn read(multipart: &mut Multipart) -> AppResult<Self> {
        let mut form = NewPost::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "title" => form.title = field.text().await?,
                "body" => form.body = field.text().await?,
                "tags" => form.tags = field.text().await?,
                "image" => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    let data = field.bytes().await?;
                    // Browsers send an empty part when no file was picked.
                    if !file_name.is_empty() && !data.is_empty() {
                        form.images.push((file_name, data));
                    }
                }
                _ => {}
            }
        }
        Ok(form)
    }

    fn validate(&self) -> Option<String> {
        if self.title.is_empty() {
            return Some("Title is required.".to_string());
        }
        self.images
            .iter()
            .find(|(name, _)| image_extension(name).is_none())
            .map(|(name, _)| uploads::UploadError::UnsupportedType(name.clone()).to_string())
    }
}

// --- Router ---

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/tag/{tag_name}", get(tag_feed))
        .route("/search", get(search))
        .route("/create", get(create_page).post(create))
        .route("/{id}", get(detail))
        .route("/{id}/update", get(update_page).post(update))
        .route("/{id}/delete", post(delete))
        .route("/{id}/like", post(like))
        .route("/{id}/comment", post(comment))
        .route("/{id}/delete/{comment_id}", post(delete_comment))
        .route("/{id}/delete/{comment_id}/", post(delete_comment))
}

// --- Feeds ---

async fn index(
    State(state): State<AppState>,
    user: MaybeUser,
    Query(query): Query<PageQuery>,
) -> AppResult<Html<IndexTemplate>> {
    render_feed(
        &state,
        user,
        FeedFilter::All,
        page_number(query.page.as_deref()),
        None,
        "/?page=".to_string(),
    )
}

async fn tag_feed(
    State(state): State<AppState>,
    user: MaybeUser,
    axum::extract::Path(tag_name): axum::extract::Path<String>,
    Query(query): Query<PageQuery>,
) -> AppResult<Html<IndexTemplate>> {
    let heading = format!("Posts tagged #{tag_name}");
    let page_base = format!("/tag/{}?page=", url_escape(&tag_name));
    render_feed(
        &state,
        user,
        FeedFilter::Tag(tag_name),
        page_number(query.page.as_deref()),
        Some(heading),
        page_base,
    )
}

async fn search(
    State(state): State<AppState>,
    user: MaybeUser,
    Query(query): Query<SearchQuery>,
) -> AppResult<Html<IndexTemplate>> {
    let heading = format!("Search results for \"{}\"", query.query);
    let page_base = format!("/search?query={}&page=", url_escape(&query.query));
    let mut page = render_feed(
        &state,
        user,
        FeedFilter::Search(query.query.clone()),
        page_number(query.page.as_deref()),
        Some(heading),
        page_base,
    )?;
    page.0.query = query.query;
    Ok(page)
}

fn render_feed(
    state: &AppState,
    user: MaybeUser,
    filter: FeedFilter,
    page: i64,
    heading: Option<String>,
    page_base: String,
) -> AppResult<Html<IndexTemplate>> {
    let viewer = user.viewer();
    let FeedPage {
        posts,
        mut images,
        pagination,
    } = {
        let conn = state.db.get()?;
        feed::load_feed(&conn, viewer, &filter, page)?
    };

    let cards = posts
        .into_iter()
        .map(|post| {
            let post_images = images.remove(&post.id).unwrap_or_default();
            PostCard::new(post, post_images, viewer)
        })
        .collect();

    Ok(Html(IndexTemplate {
        user: user.0.map(|u| u.username),
        heading,
        query: String::new(),
        cards,
        pagination,
        page_base,
    }))
}

// --- Create ---

async fn create_page(user: CurrentUser) -> Html<CreateTemplate> {
    Html(CreateTemplate {
        user: Some(user.username),
        error: None,
        title: String::new(),
        body: String::new(),
        tags: String::new(),
    })
}

async fn create(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let form = NewPost::read(&mut multipart).await?;

    if let Some(error) = form.validate() {
        return Ok(Html(CreateTemplate {
            user: Some(user.username),
            error: Some(error),
            title: form.title,
            body: form.body,
            tags: form.tags,
        })
        .into_response());
    }

    let dir = state.config.uploads_path();
    let mut saved = Vec::new();
    let result = {
        let mut conn = state.db.get()?;
        insert_post(&mut conn, user.id, &form, &dir, &mut saved)
    };
    if result.is_err() {
        remove_uploads(&dir, &saved);
    }
    let post_id = result?;

    tracing::info!(
        "{} created post {} with {} image(s)",
        user.username,
        post_id,
        saved.len()
    );
    Ok(Redirect::to("/").into_response())
}

/// Post row, tags and image rows in one transaction. Names of files written
/// to `dir` are pushed to `saved` as they land so the caller can clean up.
fn insert_post(
    conn: &mut Connection,
    author_id: i64,
    form: &NewPost,
    dir: &Path,
    saved: &mut Vec<String>,
) -> AppResult<i64> {
    let tx = conn.transaction()?;
    let post_id = posts::create_post(&tx, author_id, &form.title, &form.body)?;
    tags::attach_tags(&tx, post_id, &tags::parse_tags(&form.tags))?;

    for (original_name, data) in &form.images {
        let filename = save_upload(dir, original_name, data)?;
        saved.push(filename.clone());
        images::insert_image(&tx, post_id, &filename)?;
    }

    tx.commit()?;
    Ok(post_id)
}

// --- Update / delete ---

async fn update_page(
    State(state): State<AppState>,
    user: CurrentUser,
    PostId(id): PostId,
) -> AppResult<Html<UpdateTemplate>> {
    let post = {
        let conn = state.db.get()?;
        posts::get_post(&conn, id, AuthorCheck::Enforce(user.id))?
    };

    Ok(Html(UpdateTemplate {
        user: Some(user.username),
        error: None,
        post_id: post.id,
        title: post.title,
        body: post.body,
    }))
}

async fn update(
    State(state): State<AppState>,
    user: CurrentUser,
    PostId(id): PostId,
    Form(form): Form<PostForm>,
) -> AppResult<Response> {
    let conn = state.db.get()?;
    posts::get_post(&conn, id, AuthorCheck::Enforce(user.id))?;

    if form.title.is_empty() {
        return Ok(Html(UpdateTemplate {
            user: Some(user.username),
            error: Some("Title is required.".to_string()),
            post_id: id,
            title: form.title,
            body: form.body,
        })
        .into_response());
    }

    posts::update_post(&conn, id, &form.title, &form.body)?;
    Ok(Redirect::to("/").into_response())
}

async fn delete(
    State(state): State<AppState>,
    user: CurrentUser,
    PostId(id): PostId,
) -> AppResult<Redirect> {
    let filenames = {
        let mut conn = state.db.get()?;
        posts::get_post(&conn, id, AuthorCheck::Enforce(user.id))?;
        posts::delete_post(&mut conn, id)?
    };
    remove_uploads(&state.config.uploads_path(), &filenames);

    tracing::info!("{} deleted post {}", user.username, id);
    Ok(Redirect::to("/"))
}

// --- Detail ---

async fn detail(
    State(state): State<AppState>,
    user: MaybeUser,
    PostId(id): PostId,
) -> AppResult<Html<PostTemplate>> {
    render_detail(&state, user, id, None, String::new())
}

fn render_detail(
    state: &AppState,
    user: MaybeUser,
    post_id: i64,
    error: Option<String>,
    comment_draft: String,
) -> AppResult<Html<PostTemplate>> {
    let viewer = user.viewer();
    let conn = state.db.get()?;

    let post = feed::post_summary(&conn, viewer, post_id)?
        .ok_or_else(|| AppError::post_not_found(post_id))?;
    let post_author = post.author_id;
    let post_images = images::images_for_post(&conn, post_id)?;
    let comments = comments::list_comments(&conn, post_id)?
        .into_iter()
        .map(|comment| CommentView::new(comment, viewer, post_author))
        .collect();

    Ok(Html(PostTemplate {
        user: user.0.map(|u| u.username),
        card: PostCard::new(post, post_images, viewer),
        comments,
        error,
        comment_draft,
    }))
}

// --- Likes ---

async fn like(
    State(state): State<AppState>,
    user: CurrentUser,
    PostId(id): PostId,
    headers: HeaderMap,
) -> AppResult<Redirect> {
    {
        let mut conn = state.db.get()?;
        if !posts::post_exists(&conn, id)? {
            return Err(AppError::post_not_found(id));
        }
        let like_state = likes::toggle_like(&mut conn, id, user.id)?;
        tracing::debug!("{} toggled like on post {}: {:?}", user.username, id, like_state);
    }

    let back = headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .map_or_else(|| "/".to_string(), local_path);
    Ok(Redirect::to(&back))
}

/// Reduce a `Referer` value to a path on this site, or `/`.
fn local_path(referer: &str) -> String {
    if referer.starts_with('/') && !referer.starts_with("//") {
        return referer.to_string();
    }
    match url::Url::parse(referer) {
        Ok(url) => match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        },
        Err(_) => "/".to_string(),
    }
}

// --- Comments ---

async fn comment(
    State(state): State<AppState>,
    user: CurrentUser,
    PostId(id): PostId,
    Form(form): Form<CommentForm>,
) -> AppResult<Response> {
    let text = form.comment.trim();
    if text.is_empty() {
        return Ok(render_detail(
            &state,
            MaybeUser(Some(user)),
            id,
            Some("Comment is required.".to_string()),
            form.comment,
        )?
        .into_response());
    }

    {
        let conn = state.db.get()?;
        if !posts::post_exists(&conn, id)? {
            return Err(AppError::post_not_found(id));
        }
        comments::create_comment(&conn, id, user.id, text)?;
    }

    Ok(Redirect::to(&format!("/{id}")).into_response())
}

async fn delete_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    path: CommentPath,
) -> AppResult<Redirect> {
    {
        let conn = state.db.get()?;
        comments::delete_comment(&conn, path.post_id, path.comment_id, user.id)?;
    }
    tracing::info!(
        "{} deleted comment {} on post {}",
        user.username,
        path.comment_id,
        path.post_id
    );
    Ok(Redirect::to(&format!("/{}", path.post_id)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(author_id: i64, tags: &[&str]) -> PostSummary {
        PostSummary {
            id: 7,
            title: "Hello".into(),
            body: "World".into(),
            body_html: "<p>World</p>\n".into(),
            created: "2025-01-15 12:00:00".into(),
            author_id,
            username: "alice".into(),
            likes: 2,
            comments: 1,
            user_liked: false,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn unparsable_page_numbers_mean_page_one() {
        assert_eq!(page_number(None), 1);
        assert_eq!(page_number(Some("3")), 3);
        assert_eq!(page_number(Some("abc")), 1);
        assert_eq!(page_number(Some("")), 1);
        assert_eq!(page_number(Some("2.5")), 1);
    }

    #[test]
    fn local_path_keeps_only_path_and_query() {
        assert_eq!(local_path("/search?query=x&page=2"), "/search?query=x&page=2");
        assert_eq!(
            local_path("http://localhost:5000/tag/rust?page=3"),
            "/tag/rust?page=3"
        );
        assert_eq!(local_path("https://evil.example/"), "/");
        assert_eq!(local_path("//evil.example/x"), "/");
        assert_eq!(local_path("not a url"), "/");
    }

    #[test]
    fn card_links_tags_and_marks_author() {
        let card = PostCard::new(summary(1, &["web dev", "intro"]), Vec::new(), Viewer::User(1));
        assert!(card.can_edit);
        assert_eq!(card.tags[0].href, "/tag/web%20dev");
        assert_eq!(card.created, "Jan 15, 2025");

        let card = PostCard::new(summary(1, &[]), Vec::new(), Viewer::Anonymous);
        assert!(!card.can_edit);
    }

    #[test]
    fn comment_delete_allowed_for_comment_or_post_author() {
        let comment = |user_id: Option<i64>| Comment {
            id: 1,
            comment: "hi".into(),
            post_id: 7,
            user_id,
            username: user_id.map(|_| "bob".to_string()),
            created: "2025-01-15 12:00:00".into(),
        };
        assert!(CommentView::new(comment(Some(2)), Viewer::User(2), 1).can_delete);
        assert!(CommentView::new(comment(Some(2)), Viewer::User(1), 1).can_delete);
        assert!(!CommentView::new(comment(Some(2)), Viewer::User(3), 1).can_delete);
        assert!(!CommentView::new(comment(None), Viewer::Anonymous, 1).can_delete);
        assert_eq!(CommentView::new(comment(None), Viewer::User(1), 1).username, "[deleted]");
    }

    #[test]
    fn new_post_validation() {
        let mut form = NewPost::default();
        assert_eq!(form.validate().as_deref(), Some("Title is required."));

        form.title = "Hello".into();
        assert_eq!(form.validate(), None);

        form.images.push(("evil.sh".into(), Bytes::from_static(b"#!")));
        assert_eq!(
            form.validate().as_deref(),
            Some("Unsupported image type: evil.sh")
        );
    }
}
