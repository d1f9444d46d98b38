//! Inter-worker control-message protocol: `Block`/`Unblock`/`Cnf`/`Ack` for
//! quiescence, `Terminate` for shutdown, `UnmuteActor` for cross-worker
//! mute-table maintenance, and ASIO side-channel notices.

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::actor::ActorHandle;

#[derive(Clone)]
pub enum ControlMsg {
    Block,
    Unblock,
    Cnf(u64),
    Ack(u64),
    Terminate,
    UnmuteActor(ActorHandle),
    NoisyAsio,
    UnnoisyAsio,
}

/// One worker's inbox: the `Sender` half is cloned out to every worker (and
/// to the scheduler lifecycle code); the `Receiver` half stays here and is
/// drained only by the owning worker's thread.
pub struct Mailbox {
    tx: Sender<ControlMsg>,
    rx: Receiver<ControlMsg>,
}

impl Mailbox {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// A cheap, cloneable handle for addressing this worker from anywhere.
    pub fn sender(&self) -> Sender<ControlMsg> {
        self.tx.clone()
    }

    pub fn receiver(&self) -> &Receiver<ControlMsg> {
        &self.rx
    }

    /// Split into the two halves, consuming the mailbox. Used at scheduler
    /// construction time to distribute the `Sender` to every worker while
    /// handing the `Receiver` exclusively to the owner's thread.
    pub fn into_parts(self) -> (Sender<ControlMsg>, Receiver<ControlMsg>) {
        (self.tx, self.rx)
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Send a message to one addressed worker. Ignores a disconnected receiver
/// (the worker has already shut down and dropped its mailbox).
pub fn send_msg(to: &Sender<ControlMsg>, msg: ControlMsg) {
    let _ = to.send(msg);
}

/// Broadcast a message to every worker (including, if present in the slice,
/// the sender itself -- callers decide whether to include their own
/// address).
pub fn send_msg_all(to: &[Sender<ControlMsg>], msg: ControlMsg) {
    for sender in to {
        send_msg(sender, msg.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailbox_delivers_fifo_from_single_sender() {
        let mailbox = Mailbox::new();
        let tx = mailbox.sender();
        send_msg(&tx, ControlMsg::Block);
        send_msg(&tx, ControlMsg::Unblock);

        let rx = mailbox.receiver();
        assert!(matches!(rx.try_recv(), Ok(ControlMsg::Block)));
        assert!(matches!(rx.try_recv(), Ok(ControlMsg::Unblock)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn send_msg_all_reaches_every_mailbox() {
        let mailboxes: Vec<Mailbox> = (0..4).map(|_| Mailbox::new()).collect();
        let senders: Vec<_> = mailboxes.iter().map(Mailbox::sender).collect();
        send_msg_all(&senders, ControlMsg::Cnf(7));

        for mailbox in &mailboxes {
            match mailbox.receiver().try_recv() {
                Ok(ControlMsg::Cnf(tok)) => assert_eq!(tok, 7),
                other => panic!("expected Cnf(7), got a different result: {}", other.is_ok()),
            }
        }
    }
}
