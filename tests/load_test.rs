//! Load while starting and stopping.

use std::time::{Duration, Instant};

use service_core::http::health_router;
use service_core::lifecycle::ServiceState;

mod common;

#[tokio::test]
async fn stop_under_load() {
    let (controller, _sink) = common::controller("api", health_router());
    controller.start(std::future::pending()).await.unwrap();
    let addr = controller.local_addr().unwrap();

    let concurrency = 20;
    let requests_per_task = 50;

    let client = common::client();
    let mut tasks = Vec::new();
    for _ in 0..concurrency {
        let client = client.clone();
        let url = format!("http://{}/health", addr);
        tasks.push(tokio::spawn(async move {
            let mut ok = 0usize;
            let mut refused = 0usize;
            for _ in 0..requests_per_task {
                match client.get(&url).send().await {
                    Ok(res) => {
                        assert_eq!(res.status(), 200, "unexpected status under load");
                        ok += 1;
                    }
                    Err(_) => refused += 1,
                }
            }
            (ok, refused)
        }));
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    let start = Instant::now();
    controller.stop(Duration::from_secs(5)).await.expect("stop under load failed");
    let drain = start.elapsed();

    let mut total_ok = 0;
    let mut total_refused = 0;
    for task in tasks {
        let (ok, refused) = task.await.unwrap();
        total_ok += ok;
        total_refused += refused;
    }

    println!("\n--- Stop Under Load ---");
    println!("Successful requests: {}", total_ok);
    println!("Refused after stop:  {}", total_refused);
    println!("Drain time:          {:?}", drain);
    println!("-----------------------\n");

    assert_eq!(total_ok + total_refused, concurrency * requests_per_task);
    assert!(total_ok > 0, "no request was served before stop");
    assert_eq!(controller.state(), ServiceState::Stopped);
    assert_eq!(controller.stop_signals_fired(), 1);
}

#[tokio::test]
async fn repeated_cycles_under_traffic() {
    let (controller, _sink) = common::controller("api", health_router());

    for _ in 0..10 {
        controller.start(std::future::pending()).await.unwrap();
        let addr = controller.local_addr().unwrap();
        assert_eq!(common::get_status(addr, "/health").await.unwrap(), 200);
        controller.stop(Duration::from_secs(2)).await.unwrap();
    }

    assert_eq!(controller.stop_signals_fired(), 10);
    assert_eq!(controller.state(), ServiceState::Stopped);
}
