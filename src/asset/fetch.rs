//! # 远程下载
//!
//! ## 设计思路
//!
//! 试穿图、身体图与遮罩大多是对象存储的预签名 URL。下载路径要做到：
//! - 每一跳都重新校验协议（重定向由我们手动跟随，不交给 HTTP 客户端）
//! - 响应头不对（状态码、内容类型、声明长度）就不读 body
//! - body 边读边限额，前几 KB 内必须能识别出图片签名
//!
//! ## 实现思路
//!
//! `next_hop` 每次只发一个请求，返回 `Hop::Redirect` 或 `Hop::Body`；
//! `CappedBody` 负责累积字节、体积上限与签名探测。
//! 只有建立连接有超时；响应迟迟不来时该区域保持上一次的合成结果，
//! 新的选择会让这次重算过期。失败直接上抛，不做重试。

use std::time::Duration;

use bytes::Bytes;
use reqwest::{StatusCode, Url, header};

use super::handler::LoaderProfile;
use super::loader::{SIGNATURE_PROBE_BYTES, probe_image_signature, require_image_signature};
use super::source::RawImageData;
use super::{AssetConfig, AssetLoader, ImageError};

const BODY_INITIAL_CAPACITY: usize = 64 * 1024;
const ACCEPT_IMAGES: &str = "image/png,image/jpeg,image/webp,image/*;q=0.8";

enum Hop {
    Redirect(Url),
    Body(reqwest::Response),
}

/// 下载缓冲：超过上限立即失败，签名在探测窗口内确认。
struct CappedBody {
    buf: Vec<u8>,
    limit: u64,
    signature_ok: bool,
}

impl CappedBody {
    fn new(declared_len: Option<u64>, limit: u64) -> Self {
        let capacity = declared_len
            .filter(|len| *len > 0 && *len <= limit)
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or(BODY_INITIAL_CAPACITY);
        Self {
            buf: Vec::with_capacity(capacity),
            limit,
            signature_ok: false,
        }
    }

    fn push(&mut self, chunk: &[u8]) -> Result<(), ImageError> {
        if (self.buf.len() + chunk.len()) as u64 > self.limit {
            return Err(ImageError::ResourceLimit(format!(
                "下载内容超过 {:.1} MB 上限",
                self.limit as f64 / 1024.0 / 1024.0
            )));
        }
        self.buf.extend_from_slice(chunk);

        if !self.signature_ok {
            self.signature_ok = probe_image_signature(&self.buf, SIGNATURE_PROBE_BYTES)?;
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<u8>, ImageError> {
        if !self.signature_ok {
            require_image_signature(&self.buf)?;
        }
        Ok(self.buf)
    }
}

impl AssetLoader {
    /// 下载远程图片。
    pub(super) async fn load_from_url(url: &str, profile: &LoaderProfile) -> Result<RawImageData, ImageError> {
        log::info!("🌐 下载图片 - {}", redact_url_for_log(url));

        let client = profile.http_client()?;
        let bytes = Self::fetch_remote(&client, url, &profile.config).await?;
        Ok(RawImageData {
            bytes: Bytes::from(bytes),
            source_hint: "url",
        })
    }

    pub(super) async fn fetch_remote(
        client: &reqwest::Client,
        url: &str,
        config: &AssetConfig,
    ) -> Result<Vec<u8>, ImageError> {
        let mut target = parse_remote_url(url)?;

        for hop in 0..=config.max_redirects {
            match next_hop(client, &target, config).await? {
                Hop::Body(response) => return read_capped(response, config).await,
                Hop::Redirect(next) => {
                    if hop == config.max_redirects {
                        break;
                    }
                    log::debug!("↪️ 重定向到 {}", redact_url_for_log(next.as_str()));
                    target = next;
                }
            }
        }

        Err(ImageError::Network(format!(
            "重定向超过 {} 次",
            config.max_redirects
        )))
    }
}

async fn next_hop(client: &reqwest::Client, target: &Url, config: &AssetConfig) -> Result<Hop, ImageError> {
    let response = client
        .get(target.clone())
        .header(header::ACCEPT, ACCEPT_IMAGES)
        .send()
        .await
        .map_err(|e| classify_send_error(&e, target, config))?;

    let status = response.status();
    if status.is_redirection() {
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ImageError::Network(format!("HTTP {} 缺少有效的 Location", status.as_u16())))?;
        let next = target
            .join(location)
            .map_err(|e| ImageError::InvalidFormat(format!("重定向地址无法解析：{}", e)))?;
        return Ok(Hop::Redirect(parse_remote_url(next.as_str())?));
    }

    if !status.is_success() {
        return Err(ImageError::Network(describe_status(status)));
    }

    if let Some(content_type) = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
    {
        if !is_image_content_type(content_type) {
            return Err(ImageError::InvalidFormat(format!("响应不是图片：{}", content_type)));
        }
    }

    if let Some(declared) = response.content_length() {
        if declared > config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "声明大小 {:.1} MB 超过上限 {:.1} MB",
                declared as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }
    }

    Ok(Hop::Body(response))
}

async fn read_capped(mut response: reqwest::Response, config: &AssetConfig) -> Result<Vec<u8>, ImageError> {
    let mut body = CappedBody::new(response.content_length(), config.max_file_size);

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| ImageError::Network(format!("读取响应失败：{}", e)))?
    {
        body.push(&chunk)?;
    }

    let bytes = body.finish()?;
    log::debug!("✅ 下载完成 - {} bytes", bytes.len());
    Ok(bytes)
}

/// 只限制建立连接的时间，响应体读取不设超时。
pub(super) fn build_http_client(config: &AssetConfig) -> Result<reqwest::Client, ImageError> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout))
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|e| ImageError::Network(format!("HTTP 客户端初始化失败：{}", e)))
}

/// 仅接受带主机名的 http/https 地址。
fn parse_remote_url(url: &str) -> Result<Url, ImageError> {
    let parsed = Url::parse(url).map_err(|e| ImageError::InvalidFormat(format!("URL 无法解析：{}", e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ImageError::InvalidFormat(format!(
            "不支持的协议：{}（仅支持 http/https）",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(ImageError::InvalidFormat("URL 缺少主机名".to_string()));
    }

    Ok(parsed)
}

fn is_image_content_type(content_type: &str) -> bool {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    essence.len() > "image/".len() && essence[.."image/".len()].eq_ignore_ascii_case("image/")
}

/// 日志里只保留协议、主机、端口与路径：预签名参数不落日志。
pub(crate) fn redact_url_for_log(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => format!(
            "{}://{}{}{}",
            parsed.scheme(),
            parsed.host_str().unwrap_or("<no-host>"),
            parsed.port().map(|p| format!(":{}", p)).unwrap_or_default(),
            parsed.path()
        ),
        Err(_) => "<invalid-url>".to_string(),
    }
}

fn describe_status(status: StatusCode) -> String {
    let hint = match status {
        StatusCode::FORBIDDEN => "预签名地址可能已过期",
        StatusCode::NOT_FOUND => "试穿图不存在或已删除",
        s if s.is_server_error() => "服务端错误",
        _ => "请求被拒绝",
    };
    format!("HTTP {}：{}", status.as_u16(), hint)
}

fn classify_send_error(e: &reqwest::Error, target: &Url, config: &AssetConfig) -> ImageError {
    let detail = e
        .to_string()
        .replace(target.as_str(), &redact_url_for_log(target.as_str()));

    if e.is_timeout() {
        ImageError::Timeout(format!("{} 秒内未能建立连接", config.connect_timeout))
    } else if e.is_connect() {
        ImageError::Network(format!("连接失败：{}", detail))
    } else {
        ImageError::Network(format!("请求失败：{}", detail))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetRef;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::{Cursor, Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn png_bytes() -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 2, Rgba([200, 100, 50, 255])))
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    /// 按顺序应答多个连接的 HTTP 桩，每个连接写回一组（响应头，响应体）。
    fn serve(responses: Vec<(String, Vec<u8>)>) -> (u16, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let port = listener.local_addr().expect("read local addr failed").port();

        let server = thread::spawn(move || {
            for (head, body) in responses {
                let (mut stream, _) = listener.accept().expect("accept failed");
                let mut req_buf = [0u8; 2048];
                let _ = stream.read(&mut req_buf);
                stream.write_all(head.as_bytes()).expect("write headers failed");
                stream.write_all(&body).expect("write body failed");
                stream.flush().expect("flush failed");
            }
        });

        (port, server)
    }

    async fn fetch(url: &str) -> Result<Vec<u8>, ImageError> {
        let config = AssetConfig::default();
        let client = build_http_client(&config).expect("client");
        AssetLoader::fetch_remote(&client, url, &config).await
    }

    fn ok_head(content_type: &str, len: usize) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            content_type, len
        )
    }

    #[test]
    fn content_type_check_ignores_params_and_case() {
        assert!(is_image_content_type("image/png; charset=binary"));
        assert!(is_image_content_type("IMAGE/JPEG"));
        assert!(!is_image_content_type("image/"));
        assert!(!is_image_content_type("text/html; charset=utf-8"));
    }

    #[test]
    fn only_http_urls_with_host_are_accepted() {
        assert!(parse_remote_url("https://cdn.example.com/a.png").is_ok());
        assert!(matches!(
            parse_remote_url("ftp://cdn.example.com/a.png"),
            Err(ImageError::InvalidFormat(_))
        ));
        assert!(matches!(parse_remote_url("not a url"), Err(ImageError::InvalidFormat(_))));
    }

    #[test]
    fn redaction_strips_presigned_query() {
        let redacted = redact_url_for_log(
            "https://bucket.s3.amazonaws.com:8443/tryon/out.png?X-Amz-Signature=abc#frag",
        );

        assert_eq!(redacted, "https://bucket.s3.amazonaws.com:8443/tryon/out.png");
    }

    #[test]
    fn capped_body_rejects_overflow_and_non_images() {
        let mut body = CappedBody::new(None, 16);
        assert!(matches!(body.push(&[0u8; 32]), Err(ImageError::ResourceLimit(_))));

        let mut body = CappedBody::new(Some(64), 1024);
        let outcome = match body.push(b"<html><body>expired</body></html>") {
            Ok(()) => body.finish().map(|_| ()),
            Err(e) => Err(e),
        };
        assert!(matches!(outcome, Err(ImageError::InvalidFormat(_))));
    }

    #[tokio::test]
    async fn downloads_and_decodes_png() {
        let png = png_bytes();
        let (port, server) = serve(vec![(ok_head("image/png", png.len()), png)]);

        let loader = AssetLoader::new(AssetConfig::default());
        let bitmap = loader
            .load(&AssetRef::Url(format!("http://127.0.0.1:{}/tryon/out.png", port)))
            .await;
        server.join().expect("server thread failed");

        let bitmap = bitmap.expect("download should succeed");
        assert_eq!(bitmap.dimensions(), (3, 2));
        assert_eq!(bitmap.pixel(0, 0), [200, 100, 50, 255]);
    }

    #[tokio::test]
    async fn stalled_body_is_awaited_until_it_arrives() {
        let png = png_bytes();
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server failed");
        let port = listener.local_addr().expect("read local addr failed").port();
        let head = ok_head("image/png", png.len());
        let body = png.clone();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept failed");
            let mut req_buf = [0u8; 2048];
            let _ = stream.read(&mut req_buf);
            stream.write_all(head.as_bytes()).expect("write headers failed");
            stream.flush().expect("flush failed");
            thread::sleep(Duration::from_millis(1500));
            stream.write_all(&body).expect("write body failed");
        });

        let started = std::time::Instant::now();
        let bytes = fetch(&format!("http://127.0.0.1:{}/slow.png", port)).await;
        server.join().expect("server thread failed");

        assert_eq!(bytes.expect("slow body should still be read"), png);
        assert!(started.elapsed() >= Duration::from_millis(1400));
    }

    #[tokio::test]
    async fn follows_relative_redirect() {
        let png = png_bytes();
        let redirect = "HTTP/1.1 302 Found\r\nLocation: /final.png\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
        let (port, server) = serve(vec![
            (redirect.to_string(), Vec::new()),
            (ok_head("image/png", png.len()), png.clone()),
        ]);

        let bytes = fetch(&format!("http://127.0.0.1:{}/start.png", port)).await;
        server.join().expect("server thread failed");

        assert_eq!(bytes.expect("redirect should be followed"), png);
    }

    #[tokio::test]
    async fn body_without_image_signature_is_rejected() {
        let body = b"hello world".to_vec();
        let (port, server) = serve(vec![(ok_head("image/png", body.len()), body)]);

        let result = fetch(&format!("http://127.0.0.1:{}/fake.png", port)).await;
        server.join().expect("server thread failed");

        assert!(matches!(result, Err(ImageError::InvalidFormat(_))));
    }

    #[tokio::test]
    async fn non_image_content_type_is_rejected() {
        let body = b"<html></html>".to_vec();
        let (port, server) = serve(vec![(ok_head("text/html", body.len()), body)]);

        let result = fetch(&format!("http://127.0.0.1:{}/page", port)).await;
        server.join().expect("server thread failed");

        assert!(matches!(result, Err(ImageError::InvalidFormat(_))));
    }

    #[tokio::test]
    async fn http_error_status_is_network_error() {
        let head = "HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
        let (port, server) = serve(vec![(head.to_string(), Vec::new())]);

        let result = fetch(&format!("http://127.0.0.1:{}/expired.png", port)).await;
        server.join().expect("server thread failed");

        assert!(matches!(result, Err(ImageError::Network(msg)) if msg.contains("403")));
    }

    #[tokio::test]
    async fn redirect_to_other_scheme_is_rejected() {
        let head = "HTTP/1.1 302 Found\r\nLocation: ftp://example.com/final.png\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";
        let (port, server) = serve(vec![(head.to_string(), Vec::new())]);

        let result = fetch(&format!("http://127.0.0.1:{}/start.png", port)).await;
        server.join().expect("server thread failed");

        assert!(matches!(result, Err(ImageError::InvalidFormat(_))));
    }
}
