//! UART framing between the outbox/request channels and the host.

use embassy_executor::task;
use embassy_stm32::mode::Async;
use embassy_stm32::usart::{RingBufferedUartRx, UartTx};
use embedded_io_async::Read;

use crate::ipc::{OUTBOX, REQUEST_CH};
use crate::protocol::{Request, HEADER_LEN, MAX_FRAME_LEN};

#[task]
pub async fn transport_tx_task(mut tx: UartTx<'static, Async>) {
    info!("Transport tx task started");
    loop {
        let frame = OUTBOX.receive().await;
        if let Err(e) = tx.write(&frame).await {
            warn!("UART tx error: {:?}", e);
        }
    }
}

#[task]
pub async fn transport_rx_task(mut rx: RingBufferedUartRx<'static>, uid: u32) {
    info!("Transport rx task started, uid {}", uid);
    let mut packet = [0u8; MAX_FRAME_LEN];

    loop {
        if rx.read_exact(&mut packet[..HEADER_LEN]).await.is_err() {
            warn!("UART rx error, dropping header");
            continue;
        }

        let length = packet[4] as usize;
        if !(HEADER_LEN..=MAX_FRAME_LEN).contains(&length) {
            warn!("Bad packet length {}", length);
            continue;
        }
        if rx.read_exact(&mut packet[HEADER_LEN..length]).await.is_err() {
            warn!("UART rx error, dropping payload");
            continue;
        }

        match Request::parse(&packet[..length]) {
            Ok((header, request)) if header.addressed_to(uid) => {
                REQUEST_CH.send((header, request)).await;
            }
            Ok(_) => {}
            Err(e) => warn!("Dropping packet: {:?}", e),
        }
    }
}
