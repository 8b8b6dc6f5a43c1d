//! Response handling shared by every translator.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use easel_contracts::models::Transport;
use easel_contracts::request::GenerationResult;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client as HttpClient, Response as HttpResponse};
use serde_json::Value;

use crate::error::{GenerationError, Result};

pub(crate) const ERROR_BODY_LIMIT: usize = 512;
pub(crate) const DEFAULT_MIME: &str = "image/png";

/// Reads a JSON body, mapping non-2xx statuses and bad JSON to typed errors.
pub(crate) async fn read_json_or_error(
    transport: Transport,
    response: HttpResponse,
) -> Result<Value> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| GenerationError::network(transport, err))?;
    if !status.is_success() {
        return Err(GenerationError::Transport {
            transport,
            status: status.as_u16(),
            message: provider_error_message(&body),
        });
    }
    serde_json::from_str(&body).map_err(|err| {
        GenerationError::malformed(
            transport,
            format!("invalid JSON ({err}): {}", truncate_text(&body, 200)),
        )
    })
}

/// `error.message`, then `message`, then the truncated raw body.
pub(crate) fn provider_error_message(body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<Value>(body) {
        let message = parsed
            .get("error")
            .and_then(|error| {
                error
                    .get("message")
                    .and_then(Value::as_str)
                    .or_else(|| error.as_str())
            })
            .or_else(|| parsed.get("message").and_then(Value::as_str))
            .map(str::trim)
            .filter(|message| !message.is_empty());
        if let Some(message) = message {
            return message.to_string();
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    truncate_text(trimmed, ERROR_BODY_LIMIT)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

/// Splits a `data:<mime>;base64,<payload>` URL into a result.
pub(crate) fn decode_data_url(transport: Transport, value: &str) -> Result<GenerationResult> {
    let (meta, payload) = value
        .trim()
        .split_once(',')
        .ok_or_else(|| GenerationError::malformed(transport, "invalid data URL image payload"))?;
    let mime = meta
        .trim()
        .strip_prefix("data:")
        .and_then(|rest| rest.split(';').next())
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .unwrap_or(DEFAULT_MIME)
        .to_string();
    let payload = payload.trim();
    if payload.is_empty() {
        return Err(GenerationError::no_image(transport, "empty data URL payload"));
    }
    Ok(GenerationResult::new(payload, mime))
}

/// Accepts an unlabelled string only when it is base64 of a known image format.
pub(crate) fn decode_bare_base64(transport: Transport, value: &str) -> Result<GenerationResult> {
    let payload = value.trim();
    let bytes = BASE64.decode(payload).map_err(|_| {
        GenerationError::malformed(
            transport,
            format!(
                "image field is neither a URL nor base64: {}",
                truncate_text(payload, 80)
            ),
        )
    })?;
    let format = image::guess_format(&bytes).map_err(|_| {
        GenerationError::malformed(transport, "base64 image field does not decode to an image")
    })?;
    Ok(GenerationResult::new(payload, format.to_mime_type()))
}

/// Downloads a remote image and inlines it as base64.
pub(crate) async fn fetch_image_as_base64(
    http: &HttpClient,
    transport: Transport,
    url: &str,
) -> Result<GenerationResult> {
    tracing::debug!(%transport, url, "fetching remote image");
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|err| GenerationError::network(transport, err))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GenerationError::Transport {
            transport,
            status: status.as_u16(),
            message: format!("image download failed: {}", truncate_text(&body, 200)),
        });
    }
    let header_mime = content_type(&response);
    let bytes = response
        .bytes()
        .await
        .map_err(|err| GenerationError::network(transport, err))?;
    if bytes.is_empty() {
        return Err(GenerationError::no_image(transport, "image download was empty"));
    }
    let mime = image_mime(header_mime.as_deref(), &bytes);
    Ok(GenerationResult::new(BASE64.encode(&bytes), mime))
}

pub(crate) fn content_type(response: &HttpResponse) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Uses an `image/*` content type when given, otherwise sniffs the bytes.
pub(crate) fn image_mime(header: Option<&str>, bytes: &[u8]) -> String {
    if let Some(header) = header.filter(|value| value.starts_with("image/")) {
        return header.to_string();
    }
    sniff_mime(bytes)
}

pub(crate) fn sniff_mime(bytes: &[u8]) -> String {
    image::guess_format(bytes)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| DEFAULT_MIME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

    #[test]
    fn provider_error_message_prefers_structured_fields() {
        assert_eq!(
            provider_error_message(r#"{"error":{"message":"quota exceeded"}}"#),
            "quota exceeded"
        );
        assert_eq!(provider_error_message(r#"{"message":"bad model"}"#), "bad model");
        assert_eq!(provider_error_message(r#"{"error":"plain"}"#), "plain");
        assert_eq!(provider_error_message("  "), "empty response body");
        let long = "x".repeat(600);
        assert_eq!(
            provider_error_message(&long).chars().count(),
            ERROR_BODY_LIMIT + 1
        );
    }

    #[test]
    fn data_url_decoding_keeps_mime() {
        let result =
            decode_data_url(Transport::OpenRouterChat, "data:image/webp;base64,UklGRg==").unwrap();
        assert_eq!(result.mime_type, "image/webp");
        assert_eq!(result.image_data, "UklGRg==");
        assert!(decode_data_url(Transport::OpenRouterChat, "no comma").is_err());
        assert!(decode_data_url(Transport::OpenRouterChat, "data:image/png;base64,").is_err());
    }

    #[test]
    fn bare_base64_must_be_an_image() {
        let png = BASE64.encode(PNG_MAGIC);
        let result = decode_bare_base64(Transport::OpenRouterChat, &png).unwrap();
        assert_eq!(result, GenerationResult::new(png, "image/png"));

        for value in ["/files/out.png", "see attached", "QUJD"] {
            let err = decode_bare_base64(Transport::OpenRouterChat, value).unwrap_err();
            assert!(matches!(err, GenerationError::MalformedResponse { .. }), "{value}");
        }
    }

    #[test]
    fn mime_prefers_image_header_then_sniffs() {
        assert_eq!(image_mime(Some("image/webp"), PNG_MAGIC), "image/webp");
        assert_eq!(image_mime(Some("application/octet-stream"), PNG_MAGIC), "image/png");
        assert_eq!(image_mime(None, JPEG_MAGIC), "image/jpeg");
        assert_eq!(sniff_mime(b"not an image"), "image/png");
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate_text("abc", 5), "abc");
        assert_eq!(truncate_text("abcdef", 3), "abc…");
    }
}
