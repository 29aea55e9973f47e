// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TCP client against an in-memory device.

#![cfg(feature = "tcp")]

#[allow(unused)]
mod device;

use std::time::Duration;

use futures::{SinkExt as _, StreamExt as _};
use modbus_engine::{
    client::{Client, ClientConfig, ClientState, Protocol, Reader as _},
    codec::tcp::ServerCodec,
    frame::tcp::TcpAdu,
    Error, Message,
};
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _, DuplexStream},
    sync::mpsc,
};
use tokio_util::codec::Framed;

use crate::device::{duplex_connector, serve_tcp, Device, UNIT_ID};

async fn connect(
    config: ClientConfig,
) -> anyhow::Result<(Client, DuplexStream, mpsc::UnboundedReceiver<DuplexStream>)> {
    device::init_logging();
    let (connector, mut devices) = duplex_connector();
    let client = Client::new(connector, Protocol::Tcp, config);
    client.start().await?;
    let stream = devices.recv().await.expect("device stream");
    Ok((client, stream, devices))
}

#[tokio::test]
async fn concurrent_requests() -> anyhow::Result<()> {
    let (client, stream, _devices) = connect(ClientConfig::default()).await?;
    let device = Device::new(UNIT_ID);
    let words: Vec<u16> = (0..50).map(|i| i * 10).collect();
    device.set_holding(0, &words);
    tokio::spawn(serve_tcp(stream, move |request: &Message| {
        device.respond(request)
    }));

    let tasks: Vec<_> = (0..50)
        .map(|address| {
            let client = client.clone();
            tokio::spawn(async move { client.read_holding_registers(UNIT_ID, address, 1).await })
        })
        .collect();
    for (address, task) in (0..50).zip(tasks) {
        let words = task.await???;
        assert_eq!(words, vec![address * 10]);
    }
    assert_eq!(client.pending_len(), 0);
    Ok(())
}

#[tokio::test]
async fn unknown_transaction_is_delivered_as_unmatched() -> anyhow::Result<()> {
    let (client, mut stream, _devices) = connect(ClientConfig::default()).await?;
    let mut unmatched = client.take_unmatched().expect("unmatched responses");
    let device = tokio::spawn(async move {
        let mut request = [0; 12];
        stream.read_exact(&mut request).await?;
        stream
            .write_all(&[
                0x77, 0x77, 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x00, 0x2A,
            ])
            .await?;
        stream
            .write_all(&[
                request[0], request[1], 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x00, 0x2B,
            ])
            .await?;
        anyhow::Ok((request, stream))
    });

    let words = client.read_holding_registers(UNIT_ID, 0x0010, 1).await??;
    assert_eq!(words, vec![0x2B]);

    let foreign = unmatched.recv().await.expect("unmatched response");
    assert_eq!(foreign.words(), Some(vec![0x2A]));

    let (request, _stream) = device.await??;
    assert_eq!(
        request[2..],
        [0x00, 0x00, 0x00, 0x06, 0x01, 0x03, 0x00, 0x10, 0x00, 0x01]
    );
    assert_eq!(client.pending_len(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn every_request_resolves() -> anyhow::Result<()> {
    let config = ClientConfig::default()
        .with_response_timeout(Duration::from_secs(1))
        .with_sweep_interval(Duration::from_millis(100));
    let (client, stream, _devices) = connect(config).await?;

    // Only requests with an even transaction id are answered.
    let device = Device::new(UNIT_ID);
    tokio::spawn(async move {
        let mut framed = Framed::new(stream, ServerCodec::default());
        while let Some(Ok(TcpAdu {
            transaction_id,
            message,
        })) = framed.next().await
        {
            if transaction_id % 2 != 0 {
                continue;
            }
            if let Some(response) = device.respond(&message) {
                let adu = TcpAdu {
                    transaction_id,
                    message: response,
                };
                if framed.send(adu).await.is_err() {
                    break;
                }
            }
        }
    });

    let handles: Vec<_> = (0..10)
        .map(|_| client.send_async(Message::read_holding_registers_request(UNIT_ID, 0, 2).unwrap()))
        .collect();
    let mut answered = 0;
    let mut timed_out = 0;
    for handle in handles {
        match handle.await {
            Ok(response) => {
                assert_eq!(response.words(), Some(vec![0, 0]));
                answered += 1;
            }
            Err(Error::Timeout(_)) => timed_out += 1,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
    assert_eq!(answered, 5);
    assert_eq!(timed_out, 5);
    assert_eq!(client.pending_len(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn silent_connection_is_lost_after_read_timeout() -> anyhow::Result<()> {
    let config = ClientConfig::default()
        .with_read_timeout(Some(Duration::from_millis(500)))
        .with_auto_reconnect(false);
    let (client, _stream, _devices) = connect(config).await?;

    let request = Message::read_input_registers_request(UNIT_ID, 0, 1)?;
    assert!(matches!(
        client.send(request).await,
        Err(Error::ConnectionLost)
    ));
    while client.state() != ClientState::Stopped {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    let request = Message::read_input_registers_request(UNIT_ID, 0, 1)?;
    assert!(matches!(
        client.send(request).await,
        Err(Error::NotConnected)
    ));
    Ok(())
}

#[tokio::test]
async fn late_response_of_cancelled_request_is_unmatched() -> anyhow::Result<()> {
    let (client, mut stream, _devices) = connect(ClientConfig::default()).await?;
    let mut unmatched = client.take_unmatched().expect("unmatched responses");

    let handle = client.send_async(Message::write_register_request(UNIT_ID, 0x0001, 0x0203));
    let mut request = [0; 12];
    stream.read_exact(&mut request).await?;
    assert!(handle.cancel());
    assert!(matches!(handle.await, Err(Error::Cancelled)));
    assert_eq!(client.pending_len(), 0);

    // The write register response is an echo of the request.
    stream.write_all(&request).await?;
    let late = unmatched.recv().await.expect("unmatched response");
    assert_eq!(late, Message::write_register_response(UNIT_ID, 0x0001, 0x0203));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn malformed_response_is_dropped() -> anyhow::Result<()> {
    let config = ClientConfig::default()
        .with_response_timeout(Duration::from_secs(1))
        .with_sweep_interval(Duration::from_millis(100))
        .with_auto_reconnect(false);
    let (client, mut stream, _devices) = connect(config).await?;

    let first = client.send_async(Message::read_holding_registers_request(UNIT_ID, 0, 1)?);
    let second = client.send_async(Message::read_holding_registers_request(UNIT_ID, 1, 1)?);
    let mut requests = [0; 24];
    stream.read_exact(&mut requests).await?;

    // The byte count of the first response is odd.
    stream
        .write_all(&[
            requests[0], requests[1], 0x00, 0x00, 0x00, 0x04, 0x01, 0x03, 0x01, 0x2A,
        ])
        .await?;
    stream
        .write_all(&[
            requests[12], requests[13], 0x00, 0x00, 0x00, 0x05, 0x01, 0x03, 0x02, 0x00, 0x2B,
        ])
        .await?;

    assert_eq!(second.await?.words(), Some(vec![0x2B]));
    assert_eq!(client.state(), ClientState::Running);
    assert!(matches!(first.await, Err(Error::Timeout(_))));
    assert_eq!(client.state(), ClientState::Running);
    assert_eq!(client.pending_len(), 0);
    Ok(())
}
