use edgeway_dns::{DnsHandler, DnsServer, UdpUpstream};
use edgeway_router::RoutingTable;
use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::BinEncodable;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;

/// Fake resolver answering every query with one A record
async fn spawn_upstream(answer: Ipv4Addr) -> SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        loop {
            let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                break;
            };
            let request = Message::from_vec(&buf[..len]).unwrap();
            let mut reply = Message::new();
            reply
                .set_id(request.id())
                .set_message_type(MessageType::Response);
            reply.add_queries(request.queries().iter().cloned());
            let name = request.queries()[0].name().clone();
            reply.add_answer(Record::from_rdata(name, 120, RData::A(A(answer))));
            socket
                .send_to(&reply.to_bytes().unwrap(), peer)
                .await
                .unwrap();
        }
    });

    addr
}

async fn start_server(
    domains: &[(&str, &str)],
    upstream: SocketAddr,
    timeout: Duration,
) -> (Arc<DnsServer>, SocketAddr) {
    let mut builder = RoutingTable::builder();
    for (host, ip) in domains {
        builder.insert(host, ip.to_string()).unwrap();
    }
    let (table, _) = builder.build();

    let handler = DnsHandler::new(
        Arc::new(table),
        Arc::new(UdpUpstream::new(upstream, timeout)),
    );
    let server = Arc::new(
        DnsServer::bind("127.0.0.1:0".parse().unwrap(), handler)
            .await
            .unwrap(),
    );
    let addr = server.local_addr().unwrap();

    let running = server.clone();
    tokio::spawn(async move { running.run().await });

    (server, addr)
}

async fn query(server: SocketAddr, names: &[&str]) -> Message {
    let mut request = Message::new();
    request.set_id(777).set_recursion_desired(true);
    for name in names {
        request.add_query(Query::query(Name::from_str(name).unwrap(), RecordType::A));
    }

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client
        .send_to(&request.to_bytes().unwrap(), server)
        .await
        .unwrap();

    let mut buf = vec![0u8; 4096];
    let (len, _) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
        .await
        .expect("no reply")
        .unwrap();
    Message::from_vec(&buf[..len]).unwrap()
}

fn addresses(reply: &Message) -> Vec<Ipv4Addr> {
    reply
        .answers()
        .iter()
        .filter_map(|r| match r.data() {
            Some(RData::A(A(ip))) => Some(*ip),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_local_and_forwarded_answers_in_one_reply() {
    let upstream = spawn_upstream(Ipv4Addr::new(93, 184, 216, 34)).await;
    let (server, addr) = start_server(
        &[("nas.lan", "192.168.1.2"), ("*.lan", "192.168.1.10")],
        upstream,
        Duration::from_secs(2),
    )
    .await;

    let reply = query(addr, &["nas.lan.", "tv.lan.", "example.com."]).await;

    assert_eq!(reply.id(), 777);
    assert!(reply.authoritative());
    assert_eq!(reply.response_code(), ResponseCode::NoError);
    assert_eq!(reply.queries().len(), 3);
    assert_eq!(
        addresses(&reply),
        vec![
            Ipv4Addr::new(192, 168, 1, 2),
            Ipv4Addr::new(192, 168, 1, 10),
            Ipv4Addr::new(93, 184, 216, 34),
        ]
    );

    assert!(server.shutdown(Duration::from_secs(1)).await);
}

#[tokio::test]
async fn test_silent_upstream_yields_servfail() {
    // bound but never answers
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let (server, addr) = start_server(
        &[],
        silent.local_addr().unwrap(),
        Duration::from_millis(100),
    )
    .await;

    let reply = query(addr, &["unknown.example."]).await;

    assert_eq!(reply.response_code(), ResponseCode::ServFail);
    assert!(reply.answers().is_empty());

    server.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_malformed_datagram_is_ignored() {
    let upstream = spawn_upstream(Ipv4Addr::new(1, 2, 3, 4)).await;
    let (server, addr) = start_server(&[("nas.lan", "192.168.1.2")], upstream, Duration::from_secs(1)).await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(&[0xde, 0xad], addr).await.unwrap();

    // the server keeps answering afterwards
    let reply = query(addr, &["nas.lan."]).await;
    assert_eq!(addresses(&reply), vec![Ipv4Addr::new(192, 168, 1, 2)]);

    server.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_shutdown_abandons_slow_queries() {
    let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let (server, addr) = start_server(&[], silent.local_addr().unwrap(), Duration::from_secs(30)).await;

    let mut request = Message::new();
    request.set_id(1);
    request.add_query(Query::query(Name::from_str("slow.example.").unwrap(), RecordType::A));
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(&request.to_bytes().unwrap(), addr).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    let drained = server.shutdown(Duration::from_millis(100)).await;
    assert!(!drained);

    // the abandoned query is never answered
    let mut buf = vec![0u8; 4096];
    let reply = tokio::time::timeout(Duration::from_millis(300), client.recv_from(&mut buf)).await;
    assert!(reply.is_err());
}
