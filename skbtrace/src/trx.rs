use flume::{Receiver, Sender};
use skbtrace_common::TraceEvent;

use crate::Result;

#[derive(Clone)]
pub struct EventTx {
	tx: Sender<TraceEvent>,
}

impl EventTx {
	pub async fn send(&self, item: TraceEvent) -> Result<()> {
		match self.tx.send_async(item).await {
			Ok(_) => Ok(()),
			Err(ex) => Err(ex.into()),
		}
	}
}

pub struct EventRx {
	rx: Receiver<TraceEvent>,
}

impl EventRx {
	pub async fn recv(&self) -> Result<TraceEvent> {
		let res = self.rx.recv_async().await?;
		Ok(res)
	}
}

pub fn new_trx_pair() -> (EventTx, EventRx) {
	let (tx, rx) = flume::unbounded::<TraceEvent>();

	let evt_tx = EventTx { tx };
	let evt_rx = EventRx { rx };

	(evt_tx, evt_rx)
}
