//! ZeroMQ link to the ns-3 gym interface.
//!
//! The scenario's `OpenGymInterface` owns a REQ socket connected to
//! `tcp://localhost:<port>`; this side binds the REP end. Every simulator
//! message is therefore a request that must be answered before the next one
//! can arrive: the init message is answered with an ack, each state with an
//! action or a stop request.

use prost::Message;
use zeromq::{Endpoint, RepSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

use crate::env::messages::{DataContainer, EnvActMsg, EnvStateMsg, SimInitAck, SimInitMsg};
use crate::error::{AuroraError, Result};
use crate::utils::Interrupt;

/// Decodes a single-frame ZeroMQ message.
pub fn decode_message<M: Message + Default>(msg: &ZmqMessage) -> Result<M> {
    if msg.len() != 1 {
        return Err(AuroraError::protocol(format!(
            "expected a single-frame message, got {} frames",
            msg.len()
        )));
    }
    let frame = msg
        .get(0)
        .ok_or_else(|| AuroraError::protocol("empty message"))?;
    Ok(M::decode(frame.as_ref())?)
}

pub fn encode_message<M: Message>(msg: &M) -> ZmqMessage {
    ZmqMessage::from(msg.encode_to_vec())
}

pub struct Ns3Bridge {
    socket: RepSocket,
    port: u16,
    interrupt: Interrupt,
}

impl Ns3Bridge {
    /// Binds the reply socket on `127.0.0.1:<port>`. Port `0` picks a free
    /// port, see [`Ns3Bridge::port`].
    pub async fn bind(port: u16, interrupt: Interrupt) -> Result<Self> {
        let mut socket = RepSocket::new();
        let endpoint = socket.bind(&format!("tcp://127.0.0.1:{}", port)).await?;
        let port = match endpoint {
            Endpoint::Tcp(_, port) => port,
            other => return Err(AuroraError::protocol(format!("bound to non-tcp endpoint {}", other))),
        };
        tracing::debug!("gym bridge listening on 127.0.0.1:{}", port);
        Ok(Self {
            socket,
            port,
            interrupt,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Waits for a simulator's init message and acknowledges it.
    pub async fn initialize(&mut self) -> Result<SimInitMsg> {
        let init: SimInitMsg = self.recv().await?;
        tracing::debug!(
            "simulator init: pid {}, shell pid {}",
            init.sim_process_id,
            init.waf_shell_process_id
        );
        let ack = SimInitAck {
            done: true,
            stop_sim_req: false,
        };
        self.send(&ack).await?;
        Ok(init)
    }

    pub async fn recv_state(&mut self) -> Result<EnvStateMsg> {
        self.recv().await
    }

    pub async fn send_action(&mut self, act_data: DataContainer) -> Result<()> {
        let msg = EnvActMsg {
            act_data: Some(act_data),
            stop_sim_req: false,
        };
        self.send(&msg).await
    }

    /// Answers the pending request with a stop, ending the simulation.
    pub async fn send_stop(&mut self) -> Result<()> {
        let msg = EnvActMsg {
            act_data: None,
            stop_sim_req: true,
        };
        self.send(&msg).await
    }

    pub async fn close(self) {
        for e in self.socket.close().await {
            tracing::debug!("error closing gym bridge socket: {}", e);
        }
    }

    async fn send<M: Message>(&mut self, msg: &M) -> Result<()> {
        self.socket.send(encode_message(msg)).await?;
        Ok(())
    }

    async fn recv<M: Message + Default>(&mut self) -> Result<M> {
        let interrupt = self.interrupt.clone();
        let msg = tokio::select! {
            biased;
            _ = interrupt.triggered() => return Err(AuroraError::Interrupted),
            msg = self.socket.recv() => msg?,
        };
        decode_message(&msg)
    }
}
