use actix_files::NamedFile;
use actix_web::{get, middleware, post, web, App, HttpRequest, HttpResponse, HttpServer, Result};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tera::Tera;

mod cache;
mod config;
mod error;
mod feed;
mod message_store;

use cache::RecentWindowCache;
use config::{load_config, DEFAULT_CONFIG_PATH};
use feed::FeedService;
use message_store::{Message, MessageStore};

// Wire shape of a message, shared by the JSON endpoints and the
// templates. Timestamps are formatted to local time here; the core
// keeps absolute instants.
#[derive(Serialize)]
struct MessageTdo {
    id: i64,
    text: String,
    sent_at: String,
    user_id: i64,
    user_name: String,
    avatar: Option<String>,
}

impl From<&Message> for MessageTdo {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id,
            text: message.text.clone(),
            sent_at: format_sent_at(message.sent_at),
            user_id: message.author.id,
            user_name: message.author.name.clone(),
            avatar: message.author.avatar.clone(),
        }
    }
}

fn format_sent_at(sent_at: i64) -> String {
    match DateTime::from_timestamp(sent_at, 0) {
        Some(utc) => utc
            .with_timezone(&Local)
            .format("%d.%m.%Y %H:%M")
            .to_string(),
        None => String::new(),
    }
}

#[derive(Deserialize)]
struct SendFormTdo {
    user: String,
    text: String,
}

#[derive(Deserialize)]
struct LatestQueryTdo {
    #[serde(default)]
    after_id: i64,
}

#[get("/static/{filename:.*}")]
async fn get_static(req: HttpRequest) -> Result<NamedFile> {
    let path = PathBuf::from(req.match_info().query("filename"));
    let mut whole_path = PathBuf::new();
    whole_path.push("static");
    whole_path.push(path);
    Ok(NamedFile::open(whole_path)?)
}

#[get("/")]
async fn get_index(data: web::Data<AppState>) -> Result<HttpResponse> {
    let messages = data.feed.initial_feed()?;
    render_feed(&data.tera, "index.html", &messages)
}

#[get("/messages")]
async fn get_messages(data: web::Data<AppState>) -> Result<HttpResponse> {
    let messages = data.feed.initial_feed()?;
    render_feed(&data.tera, "messages.html", &messages)
}

#[get("/messages/latest")]
async fn get_latest(
    query: web::Query<LatestQueryTdo>,
    data: web::Data<AppState>,
) -> Result<HttpResponse> {
    let messages = data.feed.feed_since(query.after_id)?;
    let tdos: Vec<MessageTdo> = messages.iter().map(MessageTdo::from).collect();
    Ok(HttpResponse::Ok().json(tdos))
}

#[post("/message")]
async fn post_message(
    form: web::Form<SendFormTdo>,
    data: web::Data<AppState>,
) -> Result<HttpResponse> {
    let author = data.feed.resolve_user(&form.user)?;
    let message = data.feed.send(author.id, &form.text)?;

    log::info!("message {} from {}", message.id, message.author.name);
    Ok(HttpResponse::Ok().json(MessageTdo::from(&message)))
}

fn render_feed(tera: &Tera, template: &str, messages: &[Message]) -> Result<HttpResponse> {
    let tdos: Vec<MessageTdo> = messages.iter().map(MessageTdo::from).collect();
    let mut context = tera::Context::new();
    context.insert("messages", &tdos);

    let output = tera
        .render(template, &context)
        .map_err(actix_web::error::ErrorInternalServerError)?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(output))
}

struct AppState {
    tera: Tera,
    feed: FeedService,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    let config = load_config(DEFAULT_CONFIG_PATH);

    if let Some(parent) = Path::new(&config.database).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let store = match MessageStore::open(&config.database) {
        Ok(store) => store,
        Err(e) => {
            log::error!("Could not open message database {}: {}", config.database, e);
            std::process::exit(1);
        }
    };

    let tera = match Tera::new("templates/*.html") {
        Ok(t) => t,
        Err(e) => {
            log::error!("Template parsing error: {}", e);
            std::process::exit(1);
        }
    };

    let feed = FeedService::new(
        store,
        RecentWindowCache::new(),
        config.window_size,
        Duration::from_secs(config.cache_ttl_secs),
    );

    let app_data = web::Data::new(AppState { tera, feed });

    log::info!("Listening on {}", config.bind);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_data.clone())
            .wrap(middleware::Logger::default())
            .service(get_static)
            .service(get_index)
            .service(get_messages)
            .service(get_latest)
            .service(post_message)
    })
    .bind(&config.bind)
    .expect("Could not bind")
    .disable_signals()
    .run();

    use futures::executor::block_on;
    let handle = server.handle();
    ctrlc::set_handler(move || {
        log::info!("Shutting down");
        block_on(handle.stop(true));
    })
    .expect("Could not setup ctrl-c handler");

    server.await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_store::UserIdentity;

    #[test]
    fn tdo_carries_the_message_shape() {
        let message = Message {
            id: 4,
            text: "Hey".to_string(),
            sent_at: 1_623_758_400, // 2021-06-15 12:00 UTC
            author: UserIdentity {
                id: 10,
                name: "Bob".to_string(),
                avatar: None,
            },
        };

        let tdo = MessageTdo::from(&message);
        assert_eq!(tdo.id, 4);
        assert_eq!(tdo.text, "Hey");
        assert_eq!(tdo.user_id, 10);
        assert_eq!(tdo.user_name, "Bob");
        assert_eq!(tdo.avatar, None);
        // Local offsets stay within a day of UTC noon.
        assert!(tdo.sent_at.contains(".06.2021"));
    }

    #[test]
    fn out_of_range_timestamp_formats_empty() {
        assert_eq!(format_sent_at(i64::MIN), "");
    }
}
