use std::io::{Cursor, Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, mpsc as std_mpsc};
use std::thread;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgba, RgbaImage};
use tokio::sync::mpsc;

use tryon_compositor::asset::{AssetConfig, AssetLoader, AssetRef};
use tryon_compositor::tryon::spawn_event_pump;
use tryon_compositor::{
    BodyRecord, Bitmap, EncodeProfile, GarmentRender, Orchestrator, PreparedBody, Region,
    RenderStatus, Selection, TryonError, TryonServiceState, compositor, mask,
};

const BLACK: [u8; 4] = [0, 0, 0, 255];
const WHITE: [u8; 4] = [255, 255, 255, 255];
const RED: [u8; 4] = [220, 20, 20, 255];
const BLUE: [u8; 4] = [20, 20, 220, 255];

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn png_bytes(image: RgbaImage) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut cursor, ImageFormat::Png)
        .expect("encode test png failed");
    cursor.into_inner()
}

fn bytes_ref(bitmap: &Bitmap) -> AssetRef {
    AssetRef::Bytes(bytes::Bytes::from(png_bytes(bitmap.as_image().clone())))
}

fn data_url(image: RgbaImage) -> String {
    format!(
        "data:image/png;base64,{}",
        general_purpose::STANDARD.encode(png_bytes(image))
    )
}

/// 行区间 `[from, to)` 不透明的遮罩图。
fn rows_mask(size: u32, from: u32, to: u32) -> Bitmap {
    Bitmap::new(RgbaImage::from_fn(size, size, |_, y| {
        if (from..to).contains(&y) { Rgba(WHITE) } else { Rgba(BLACK) }
    }))
}

fn split_body(size: u32) -> Arc<PreparedBody> {
    Arc::new(
        PreparedBody::new("body-1", Bitmap::filled(size, size, BLACK))
            .with_mask(Region::Upper, &rows_mask(size, 0, size / 2))
            .with_mask(Region::Lower, &rows_mask(size, size / 2, size))
            .with_mask(Region::Dress, &rows_mask(size, 0, size)),
    )
}

fn orchestrator() -> Arc<Orchestrator> {
    Arc::new(Orchestrator::new(
        Arc::new(AssetLoader::new(AssetConfig::default())),
        EncodeProfile::Speed,
    ))
}

#[test]
fn upper_half_white_garment_on_black_body() {
    let base = Bitmap::filled(512, 512, BLACK);
    let garment = Bitmap::filled(512, 512, WHITE);
    let upper = mask::normalize_gray(
        &GrayImage::from_fn(512, 512, |_, y| if y < 256 { Luma([255]) } else { Luma([0]) }),
        512,
        512,
    );

    let out = compositor::apply(&base, &garment, &upper);

    assert_eq!(out.dimensions(), (512, 512));
    for y in [0, 100, 255] {
        for x in [0, 300, 511] {
            assert_eq!(out.pixel(x, y), WHITE, "({x},{y}) should be white");
        }
    }
    for y in [256, 400, 511] {
        for x in [0, 300, 511] {
            assert_eq!(out.pixel(x, y), BLACK, "({x},{y}) should be black");
        }
    }
}

#[tokio::test]
async fn upper_and_lower_equal_nested_apply() {
    init_logger();
    let body = split_body(64);
    let garment_a = Bitmap::filled(64, 64, RED);
    let garment_b = Bitmap::filled(64, 64, BLUE);
    let selection = Selection {
        upper: Some(GarmentRender::ready("a", "shirt", Region::Upper, bytes_ref(&garment_a))),
        lower: Some(GarmentRender::ready("b", "jeans", Region::Lower, bytes_ref(&garment_b))),
        dress: None,
    };

    let result = orchestrator()
        .recompute(body.clone(), &selection)
        .await
        .expect("recompute failed");

    let mu = body.mask(Region::Upper).expect("upper mask");
    let ml = body.mask(Region::Lower).expect("lower mask");
    let upper_first = compositor::apply(&compositor::apply(body.base(), &garment_a, mu), &garment_b, ml);
    let lower_first = compositor::apply(&compositor::apply(body.base(), &garment_b, ml), &garment_a, mu);

    assert_eq!(result.bitmap, upper_first);
    assert_eq!(result.bitmap, lower_first);
    assert_eq!(result.applied, vec!["a".to_string(), "b".to_string()]);
}

#[tokio::test]
async fn dress_with_upper_equals_dress_alone() {
    let body = split_body(32);
    let dress = GarmentRender::ready("d", "gown", Region::Dress, bytes_ref(&Bitmap::filled(32, 32, WHITE)));
    let upper = GarmentRender::ready("u", "shirt", Region::Upper, bytes_ref(&Bitmap::filled(32, 32, RED)));
    let orchestrator = orchestrator();

    let misuse = Selection {
        upper: Some(upper),
        lower: None,
        dress: Some(dress.clone()),
    };
    let only_dress = Selection {
        dress: Some(dress),
        ..Selection::default()
    };

    let a = orchestrator.recompute(body.clone(), &misuse).await.expect("recompute misuse");
    let b = orchestrator.recompute(body, &only_dress).await.expect("recompute dress");

    assert_eq!(a.bitmap, b.bitmap);
    assert_eq!(a.applied, vec!["d".to_string()]);
}

#[tokio::test]
async fn pending_upper_composites_to_base() {
    let body = split_body(16);
    let selection = Selection {
        upper: Some(GarmentRender::pending("body-1", "shirt", Region::Upper)),
        ..Selection::default()
    };

    let result = orchestrator().recompute(body.clone(), &selection).await.expect("recompute");

    assert_eq!(&result.bitmap, body.base());
    assert!(result.applied.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stale_generation_is_discarded() {
    init_logger();
    let slow_png = png_bytes(RgbaImage::from_pixel(16, 16, Rgba(RED)));
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
    let port = listener.local_addr().expect("local addr").port();
    let (accepted_tx, accepted_rx) = std_mpsc::channel::<()>();
    let (release_tx, release_rx) = std_mpsc::channel::<()>();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept failed");
        let mut buf = [0u8; 1024];
        let _ = stream.read(&mut buf);
        accepted_tx.send(()).expect("signal accepted");
        release_rx.recv().expect("wait release");
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            slow_png.len()
        );
        stream.write_all(head.as_bytes()).expect("write head");
        stream.write_all(&slow_png).expect("write body");
    });

    let body = split_body(16);
    let orchestrator = orchestrator();

    let slow_selection = Selection {
        upper: Some(GarmentRender::ready(
            "slow",
            "shirt",
            Region::Upper,
            AssetRef::Url(format!("http://127.0.0.1:{port}/slow.png")),
        )),
        ..Selection::default()
    };
    let slow = {
        let orchestrator = orchestrator.clone();
        let body = body.clone();
        tokio::spawn(async move { orchestrator.recompute(body, &slow_selection).await })
    };

    tokio::task::spawn_blocking(move || accepted_rx.recv_timeout(Duration::from_secs(10)))
        .await
        .expect("join")
        .expect("slow request never arrived");

    let fast_selection = Selection {
        upper: Some(GarmentRender::ready("fast", "shirt", Region::Upper, bytes_ref(&Bitmap::filled(16, 16, BLUE)))),
        ..Selection::default()
    };
    let fast = orchestrator.recompute(body, &fast_selection).await.expect("fast recompute");
    assert_eq!(fast.generation, 2);

    release_tx.send(()).expect("release server");
    let slow_result = slow.await.expect("join slow");
    server.join().expect("server thread");

    assert!(matches!(
        slow_result,
        Err(TryonError::StaleGeneration { generation: 1, latest: 2 })
    ));
    let current = orchestrator.current().expect("published result");
    assert_eq!(current.generation, 2);
    assert_eq!(current.applied, vec!["fast".to_string()]);
    assert_eq!(current.bitmap.pixel(0, 0), BLUE);
}

#[tokio::test]
async fn service_event_pump_recomposes_selected_render() {
    init_logger();
    let service = Arc::new(TryonServiceState::new().expect("service"));
    let size = 24;

    service
        .load_body(BodyRecord {
            id: "body-1".to_string(),
            image_url: data_url(RgbaImage::from_pixel(size, size, Rgba(BLACK))),
            mask_upper: Some(data_url(rows_mask(size, 0, size / 2).into_image())),
            mask_lower: Some(data_url(rows_mask(size, size / 2, size).into_image())),
            mask_dress: None,
        })
        .await
        .expect("load body");

    service.register_clothing("shirt-9", "Tops").expect("register");
    service.request_tryon("body-1", "shirt-9").expect("request");
    let selection = service.select("pending-shirt-9").expect("select placeholder");
    assert_eq!(selection.upper.as_ref().map(|r| r.status), Some(RenderStatus::Pending));

    let first = service.recompute().await.expect("first recompute");
    assert!(first.applied.is_empty());

    let mut results = service.subscribe();
    results.borrow_and_update();

    let (tx, rx) = mpsc::channel(8);
    let pump = spawn_event_pump(service.clone(), rx);

    let event = serde_json::json!({
        "type": "tryon_update",
        "tryon_id": "t-42",
        "clothing_id": "shirt-9",
        "body_id": "body-1",
        "status": "ready",
        // 试穿图尺寸与身体图不同，合成前会被缩放
        "output_url": data_url(RgbaImage::from_pixel(12, 12, Rgba(RED))),
        "version": 1
    });
    tx.send(r#"{"type":"heartbeat"}"#.to_string()).await.expect("send heartbeat");
    tx.send(event.to_string()).await.expect("send event");

    tokio::time::timeout(Duration::from_secs(10), results.changed())
        .await
        .expect("no result published")
        .expect("watch closed");

    let published = service.current_result().expect("current result");
    assert_eq!(published.applied, vec!["t-42".to_string()]);
    assert_eq!(published.bitmap.pixel(3, 3), RED);
    assert_eq!(published.bitmap.pixel(3, size - 1), BLACK);

    let dir = std::env::temp_dir().join(format!("tryon-scenario-{}", std::process::id()));
    let path = service.export_current(&dir).expect("export");
    let decoded = image::open(&path).expect("exported png").to_rgba8();
    assert_eq!(&decoded, published.bitmap.as_image());

    drop(tx);
    pump.await.expect("pump task");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn selection_change_discards_inflight_recompute() {
    init_logger();
    let slow_png = png_bytes(RgbaImage::from_pixel(16, 16, Rgba(RED)));
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind failed");
    let port = listener.local_addr().expect("local addr").port();
    let (accepted_tx, accepted_rx) = std_mpsc::channel::<()>();
    let (release_tx, release_rx) = std_mpsc::channel::<()>();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept failed");
        let mut buf = [0u8; 1024];
        let _ = stream.read(&mut buf);
        accepted_tx.send(()).expect("signal accepted");
        release_rx.recv().expect("wait release");
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            slow_png.len()
        );
        stream.write_all(head.as_bytes()).expect("write head");
        stream.write_all(&slow_png).expect("write body");
    });

    let service = Arc::new(TryonServiceState::new().expect("service"));
    service
        .load_body(BodyRecord {
            id: "body-1".to_string(),
            image_url: data_url(RgbaImage::from_pixel(16, 16, Rgba(BLACK))),
            mask_upper: Some(data_url(rows_mask(16, 0, 8).into_image())),
            mask_lower: None,
            mask_dress: None,
        })
        .await
        .expect("load body");
    service.register_clothing("shirt", "upper").expect("register");
    service
        .sync_tryons(vec![GarmentRender::ready(
            "t1",
            "shirt",
            Region::Upper,
            AssetRef::Url(format!("http://127.0.0.1:{port}/t1.png")),
        )])
        .expect("sync");
    service.select("t1").expect("select");

    let inflight = {
        let service = service.clone();
        tokio::spawn(async move { service.recompute().await })
    };
    tokio::task::spawn_blocking(move || accepted_rx.recv_timeout(Duration::from_secs(10)))
        .await
        .expect("join")
        .expect("render request never arrived");

    assert!(service.clear_selection().expect("clear").is_empty());

    release_tx.send(()).expect("release server");
    let inflight = inflight.await.expect("join recompute");
    server.join().expect("server thread");

    assert!(matches!(inflight, Err(TryonError::StaleGeneration { .. })));
    assert!(service.current_result().is_none());

    let fresh = service.recompute().await.expect("recompute after clear");
    assert!(fresh.applied.is_empty());
    assert_eq!(fresh.bitmap.pixel(0, 0), BLACK);
}
