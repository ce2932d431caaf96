//! One-shot flash messages carried in a cookie across a 303 redirect.
//!
//! Mutating endpoints answer plain form posts with a redirect that sets the
//! `flash` cookie; the next page view reads it back into its `messages`
//! list and clears it. XHR callers get JSON instead.

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use url::form_urlencoded;

pub const FLASH_COOKIE: &str = "flash";
const CLEAR_FLASH: &str = "flash=; Path=/; HttpOnly; Max-Age=0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FlashLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlashMessage {
    pub level: FlashLevel,
    pub message: String,
}

/// True for requests sent with `X-Requested-With: XMLHttpRequest`.
pub fn is_ajax(headers: &HeaderMap) -> bool {
    headers
        .get("x-requested-with")
        .and_then(|value| value.to_str().ok())
        .map_or(false, |value| value.eq_ignore_ascii_case("XMLHttpRequest"))
}

fn encode_flash(level: FlashLevel, message: &str) -> String {
    form_urlencoded::byte_serialize(format!("{}:{}", level, message).as_bytes()).collect()
}

/// `303 See Other` to `location`, leaving a flash message behind.
pub fn redirect_with_flash(location: &str, level: FlashLevel, message: impl AsRef<str>) -> Response {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        FLASH_COOKIE,
        encode_flash(level, message.as_ref())
    );

    let mut response = StatusCode::SEE_OTHER.into_response();
    let headers = response.headers_mut();
    if let Ok(location) = HeaderValue::from_str(location) {
        headers.insert(header::LOCATION, location);
    }
    if let Ok(cookie) = HeaderValue::from_str(&cookie) {
        headers.insert(header::SET_COOKIE, cookie);
    }
    response
}

/// Reads the pending flash message from the request cookies, if any.
pub fn read_flash(headers: &HeaderMap) -> Option<FlashMessage> {
    let raw = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == FLASH_COOKIE)
        .map(|(_, value)| value)?;

    let decoded: String = form_urlencoded::parse(format!("v={}", raw).as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())?;
    let (level, message) = decoded.split_once(':')?;

    Some(FlashMessage {
        level: level.parse().ok()?,
        message: message.to_string(),
    })
}

#[derive(Serialize)]
struct PageBody<T> {
    #[serde(flatten)]
    data: T,
    messages: Vec<FlashMessage>,
}

/// JSON page model with any pending flash message attached and consumed.
pub fn page<T: Serialize>(headers: &HeaderMap, data: T) -> Response {
    let flash = read_flash(headers);
    let consumed = flash.is_some();

    let mut response = Json(PageBody {
        data,
        messages: flash.into_iter().collect(),
    })
    .into_response();

    if consumed {
        response
            .headers_mut()
            .insert(header::SET_COOKIE, HeaderValue::from_static(CLEAR_FLASH));
    }
    response
}
