//! Integration tests: PocketClient <-> scripted in-process platform

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use futures_util::StreamExt;
use pocket_client::{Config, ConnectionState, Error, PocketClient, StreamItem, Validator};
use pocket_clock::AnchoredClock;
use pocket_gateway::{ChannelConnector, ChannelServer, GatewayError, ServerConnection};
use serde_json::{Value, json};
use tokio::time::Instant;

const SSID: &str = r#"42["auth",{"session":"abc","isDemo":1,"uid":7,"platform":2}]"#;
const URL: &str = "ws://platform.test/socket.io/?EIO=4&transport=websocket";
const START: i64 = 1_700_000_000;
const DEAL_ID: &str = "5d1c7a52-8a6e-4f0e-9c55-3b1f0e2d4a6c";

fn config() -> Config {
    Config::builder()
        .max_allowed_loops(3)
        .sleep_interval(Duration::from_millis(100))
        .reconnect_time(Duration::from_secs(1))
        .timeout(Duration::from_secs(10))
        .extra_duration(Duration::from_secs(5))
        .build()
        .unwrap()
}

async fn connect() -> (PocketClient, ServerConnection, ChannelServer) {
    let _ = env_logger::try_init();
    let (connector, mut server) = ChannelConnector::pair();
    let clock = AnchoredClock::new(DateTime::from_timestamp(START, 0));
    let client = PocketClient::builder(SSID)
        .config(config())
        .url(URL)
        .connector(Arc::new(connector))
        .clock(Arc::new(clock))
        .connect();
    let accept = async {
        let mut conn = server.accept().await.unwrap();
        assert_eq!(conn.accept_handshake().await.as_deref(), Some(SSID));
        conn
    };
    let (client, conn) = tokio::join!(client, accept);
    (client.unwrap(), conn, server)
}

fn json(text: &str) -> Value {
    serde_json::from_str(text).unwrap()
}

/// Payload object of a `42["name",{..}]` frame sent by the client
fn payload(frame: &str) -> Value {
    let value: Value = serde_json::from_str(&frame[2..]).unwrap();
    value[1].clone()
}

fn deal(profit: Option<f64>) -> Value {
    let mut deal = json!({
        "id": DEAL_ID,
        "asset": "EURUSD_otc",
        "amount": 1.0,
        "command": 0,
        "openTimestamp": START,
        "closeTimestamp": START + 60,
    });
    if let Some(profit) = profit {
        deal["profit"] = json!(profit);
    }
    deal
}

#[tokio::test(start_paused = true)]
async fn test_buy_then_check_win() {
    let (client, mut conn, _server) = connect().await;
    assert!(client.is_demo());
    assert_eq!(client.connection_state(), ConnectionState::Connected);

    let buy = client.buy("EURUSD_otc", 1.0, 60);
    let platform = async {
        let order = payload(&conn.recv().await.unwrap());
        assert_eq!(order["action"], "call");
        assert_eq!(order["isDemo"], 1);
        assert_eq!(order["time"], 60);
        let mut confirmation = deal(None);
        confirmation["requestId"] = order["requestId"].clone();
        conn.send_text(format!("42[\"successopenOrder\",{}]", confirmation));
    };
    let (bought, _) = tokio::join!(buy, platform);
    let (id, trade) = bought.unwrap();
    let trade = json(&trade);

    assert_eq!(id.to_string(), DEAL_ID);
    assert_eq!(trade["asset"], "EURUSD_otc");
    assert_eq!(client.get_deal_end_time(id), Some(START + 60));
    assert_eq!(json(&client.opened_deals()).as_array().unwrap().len(), 1);

    let started = Instant::now();
    let check = client.check_win(id);
    let settle = async {
        tokio::time::sleep(Duration::from_secs(61)).await;
        conn.send_text(format!(
            "42[\"successcloseOrder\",{}]",
            json!({ "profit": 0.92, "deals": [deal(Some(0.92))] })
        ));
    };
    let (result, _) = tokio::join!(check, settle);
    let result = json(&result.unwrap());

    assert_eq!(result["result"], "win");
    assert_eq!(result["profit"], 0.92);
    assert!(started.elapsed() < Duration::from_secs(62));
    assert!(json(&client.opened_deals()).as_array().unwrap().is_empty());
    assert_eq!(json(&client.closed_deals()).as_array().unwrap().len(), 1);

    client.clear_closed_deals();
    assert!(json(&client.closed_deals()).as_array().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_order() {
    let (client, mut conn, _server) = connect().await;

    let sell = client.sell("EURUSD_otc", 1_000_000.0, 60);
    let platform = async {
        let order = payload(&conn.recv().await.unwrap());
        assert_eq!(order["action"], "put");
        conn.send_text(format!(
            "42[\"failopenOrder\",{}]",
            json!({ "error": "not_money", "requestId": order["requestId"] })
        ));
    };
    let (result, _) = tokio::join!(sell, platform);

    match result {
        Err(Error::OrderRejected(reason)) => assert!(reason.contains("not_money")),
        other => panic!("expected a rejection, got {:?}", other),
    }
    assert!(json(&client.opened_deals()).as_array().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_get_candles_echoes_index() {
    let (client, mut conn, _server) = connect().await;

    let candles = client.get_candles("EURUSD_otc", 60, 3600);
    let platform = async {
        let request = payload(&conn.recv().await.unwrap());
        assert_eq!(request["asset"], "EURUSD_otc");
        assert_eq!(request["period"], 60);
        assert_eq!(request["offset"], 3600);
        // no ticks yet: server time falls back to the client clock
        assert_eq!(request["time"], START);
        let index = request["index"].as_u64().unwrap();
        assert_eq!(index / 100, START as u64);

        // answer to some other request first
        conn.send_text(r#"42["loadHistoryPeriod",{"index":1,"data":[]}]"#);
        conn.send_text(format!(
            "42[\"loadHistoryPeriod\",{}]",
            json!({ "index": index, "data": [{"open": 1.1, "close": 1.2, "time": START}] })
        ));
    };
    let (candles, _) = tokio::join!(candles, platform);

    let candles = json(&candles.unwrap());
    assert_eq!(candles.as_array().unwrap().len(), 1);
    assert_eq!(candles[0]["close"], 1.2);
}

#[tokio::test(start_paused = true)]
async fn test_history_after_symbol_change() {
    let (client, mut conn, _server) = connect().await;

    let history = client.history("EURUSD_otc", 60);
    let platform = async {
        let request = payload(&conn.recv().await.unwrap());
        assert_eq!(request["asset"], "EURUSD_otc");
        conn.send_text(r#"42["updateHistoryNewFast",{"asset":"GBPUSD","history":[[1,2.0]]}]"#);
        conn.send_text(
            r#"42["updateHistoryNewFast",{"asset":"EURUSD_otc","period":60,"history":[[1700000000,1.08],[1700000001,1.09]]}]"#,
        );
    };
    let (history, _) = tokio::join!(history, platform);

    assert_eq!(json(&history.unwrap()).as_array().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_pushed_state() {
    let (client, conn, _server) = connect().await;

    conn.send_text(r#"42["successupdateBalance",{"isDemo":1,"balance":50000.0}]"#);
    conn.send_text(r#"42["updateAssets",[[5,"EURUSD_otc","EUR/USD OTC","currency",2,92]]]"#);
    conn.send_text(r#"42["updateStream",[["EURUSD_otc",1700000123.5,1.0812]]]"#);

    assert_eq!(json(&client.balance().await.unwrap())["balance"], 50000.0);
    assert_eq!(json(&client.payout().await.unwrap())[0][1], "EURUSD_otc");
    // let the reader drain the tick
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(client.get_server_time(), 1_700_000_123);
}

#[tokio::test(start_paused = true)]
async fn test_balance_times_out_without_push() {
    let (client, _conn, _server) = connect().await;

    let started = Instant::now();
    assert!(matches!(client.balance().await, Err(Error::UnexpectedResponse(_))));
    assert_eq!(started.elapsed(), Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_symbol_filters_asset() {
    let (client, mut conn, _server) = connect().await;

    let mut ticks = client.subscribe_symbol("EURUSD_otc").await.unwrap();
    let change = payload(&conn.recv().await.unwrap());
    assert_eq!(change["asset"], "EURUSD_otc");

    conn.send_text(r#"42["updateStream",[["EURUSD_otc",1700000000,1.1]]]"#);
    conn.send_text(r#"42["updateStream",[["GBPUSD",1700000000,1.3]]]"#);
    conn.send_text(r#"42["updateStream",[["EURUSD_otc",1700000001,1.2]]]"#);
    conn.send_text(r#"42["updateStream",[["EURUSD_otc",1700000002,1.3]]]"#);

    let mut prices = Vec::new();
    for _ in 0..3 {
        let item = ticks.next().await.unwrap().unwrap();
        let tick = item.into_messages()[0].json().unwrap();
        prices.push(tick[0][2].as_f64().unwrap());
    }
    assert_eq!(prices, vec![1.1, 1.2, 1.3]);
}

#[tokio::test(start_paused = true)]
async fn test_subscribe_symbol_chunked() {
    let (client, mut conn, _server) = connect().await;

    let mut ticks = client
        .subscribe_symbol_chunked("EURUSD_otc", NonZeroUsize::new(2).unwrap())
        .await
        .unwrap();
    conn.recv().await.unwrap();

    for i in 0..5 {
        conn.send_text(format!(r#"42["updateStream",[["EURUSD_otc",{},1.0]]]"#, START + i));
    }

    for _ in 0..2 {
        match ticks.next_item().await.unwrap().unwrap() {
            StreamItem::Chunk(batch) => assert_eq!(batch.len(), 2),
            other => panic!("expected a chunk, got {:?}", other),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_raw_iterator_with_timeout() {
    let (client, mut conn, _server) = connect().await;

    let mut raw = client
        .create_raw_iterator(
            r#"42["subscribeMessage",{"name":"signals"}]"#,
            Validator::contains("signal"),
            Some(Duration::from_secs(3)),
        )
        .await
        .unwrap();
    assert_eq!(
        conn.recv().await.as_deref(),
        Some(r#"42["subscribeMessage",{"name":"signals"}]"#)
    );

    conn.send_text(r#"42["signal",{"v":1}]"#);
    assert!(raw.next_item().await.unwrap().is_ok());

    let started = Instant::now();
    assert!(raw.next_item().await.is_none());
    assert!(started.elapsed() <= Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_raw_order_round_trip() {
    let (client, mut conn, _server) = connect().await;

    let order = client.create_raw_order(r#"42["ping-me"]"#, Validator::starts_with(r#"42["pong-me""#));
    let platform = async {
        assert_eq!(conn.recv().await.as_deref(), Some(r#"42["ping-me"]"#));
        conn.send_text(r#"42["pong-me",{"ok":true}]"#);
    };
    let (reply, _) = tokio::join!(order, platform);
    assert_eq!(reply.unwrap().json().unwrap()["ok"], true);

    let result = client
        .create_raw_order_with_timeout(r#"42["ignored"]"#, Validator::contains("never"), Duration::from_secs(2))
        .await;
    assert!(matches!(
        result,
        Err(Error::Gateway(GatewayError::CorrelationTimeout { .. }))
    ));
}

#[tokio::test]
async fn test_invalid_inputs_fail_before_connecting() {
    let (connector, server) = ChannelConnector::pair();
    let connector = Arc::new(connector);

    let bad_ssid = PocketClient::builder("  ")
        .url(URL)
        .connector(connector.clone())
        .connect()
        .await;
    assert!(matches!(bad_ssid, Err(Error::Ssid(_))));

    let bad_url = PocketClient::builder(SSID)
        .url("https://platform.test/")
        .connector(connector)
        .connect()
        .await;
    assert!(matches!(bad_url, Err(Error::Config(_))));

    assert!(server.attempts().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_reports_disconnected() {
    let (client, _conn, _server) = connect().await;
    let mut ticks = client.subscribe_symbol("EURUSD_otc").await.unwrap();

    client.shutdown().await;

    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert!(ticks.next().await.is_none());
    assert!(matches!(
        client.subscribe_symbol("GBPUSD").await,
        Err(Error::Gateway(GatewayError::ChannelClosed))
    ));
}
