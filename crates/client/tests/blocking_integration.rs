//! BlockingClient driven from plain threads against the in-process platform

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pocket_client::{BlockingClient, Config, PocketClient, Validator};
use pocket_gateway::ChannelConnector;

const SSID: &str = r#"42["auth",{"session":"abc","isDemo":0,"uid":7,"platform":2}]"#;
const URL: &str = "wss://platform.test/socket.io/?EIO=4&transport=websocket";

#[test]
fn test_blocking_calls_and_iterator() {
    let (connector, mut server) = ChannelConnector::pair();

    // platform side on its own runtime
    let platform = thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let mut conn = server.accept().await.unwrap();
            conn.accept_handshake().await.unwrap();
            conn.send_text(r#"42["successupdateBalance",{"isDemo":0,"balance":12.5}]"#);

            assert_eq!(conn.recv().await.as_deref(), Some(r#"42["echo"]"#));
            conn.send_text(r#"42["echoed",{"n":1}]"#);

            let change = conn.recv().await.unwrap();
            assert!(change.contains("changeSymbol"));
            for price in [1.1, 1.2] {
                conn.send_text(format!(r#"42["updateStream",[["EURUSD_otc",1700000000,{}]]]"#, price));
            }
            // keep the connection open until the client is done
            while conn.recv().await.is_some() {}
        });
    });

    let config = Config::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    let client = BlockingClient::connect(
        PocketClient::builder(SSID)
            .config(config)
            .url(URL)
            .connector(Arc::new(connector)),
    )
    .unwrap();

    assert!(!client.is_demo());
    let balance: serde_json::Value = serde_json::from_str(&client.balance().unwrap()).unwrap();
    assert_eq!(balance["balance"], 12.5);

    let reply = client
        .create_raw_order(r#"42["echo"]"#, Validator::starts_with(r#"42["echoed""#))
        .unwrap();
    assert_eq!(reply.json().unwrap()["n"], 1);

    let ticks: Vec<_> = client
        .subscribe_symbol("EURUSD_otc")
        .unwrap()
        .take(2)
        .map(|item| item.unwrap().into_messages()[0].json().unwrap()[0][2].as_f64().unwrap())
        .collect();
    assert_eq!(ticks, vec![1.1, 1.2]);

    drop(client);
    platform.join().unwrap();
}

#[test]
fn test_drop_on_async_thread() {
    let (connector, mut server) = ChannelConnector::pair();

    let platform = thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let mut conn = server.accept().await.unwrap();
            conn.accept_handshake().await.unwrap();
            let mut received = Vec::new();
            // ends once the client's writer is gone
            while let Some(frame) = conn.recv().await {
                received.push(frame);
            }
            received
        })
    });

    let client = BlockingClient::connect(
        PocketClient::builder(SSID)
            .url(URL)
            .connector(Arc::new(connector)),
    )
    .unwrap();
    let ticks = client.subscribe_symbol("EURUSD_otc").unwrap();

    let caller = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    caller.block_on(async move {
        drop(client);
        // last holder of the client's runtime
        drop(ticks);
    });

    let received = platform.join().unwrap();
    assert!(received.iter().any(|frame| frame.contains("changeSymbol")));
}
