//! 相机控制命令的执行线程
//!
//! 帧回调上下文只负责投递命令，真正的解绑在这里串行执行，
//! 不会阻塞或重入帧投递路径。
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel as channel;
use tracing::{debug, warn};

use crate::controller::Shared;

pub(crate) enum Command {
    /// 解绑并转入 Paused；`generation` 过期则丢弃
    Pause { generation: u64, not_before: Instant },
    /// 之前的命令全部执行完后应答
    Flush(channel::Sender<()>),
}

pub(crate) struct CommandExecutor {
    tx: Option<channel::Sender<Command>>,
    handle: Option<JoinHandle<()>>,
}

impl CommandExecutor {
    pub(crate) fn spawn(shared: Arc<Shared>, capacity: usize) -> Self {
        let (tx, rx) = channel::bounded::<Command>(capacity.max(1));
        let handle = std::thread::spawn(move || {
            while let Ok(cmd) = rx.recv() {
                match cmd {
                    Command::Pause { generation, not_before } => {
                        let now = Instant::now();
                        if not_before > now { std::thread::sleep(not_before - now); }
                        shared.apply_pause(generation);
                    }
                    Command::Flush(ack) => { let _ = ack.send(()); }
                }
            }
            debug!("camera command executor stopped");
        });
        Self { tx: Some(tx), handle: Some(handle) }
    }

    /// 非阻塞投递；通道已满或已关闭时返回 false
    pub(crate) fn submit(&self, cmd: Command) -> bool {
        match self.tx.as_ref() {
            Some(tx) => match tx.try_send(cmd) {
                Ok(()) => true,
                Err(e) => { warn!(full = e.is_full(), "camera command dropped"); false }
            },
            None => false,
        }
    }

    /// 阻塞直到此前投递的命令全部执行完
    pub(crate) fn flush(&self) {
        let Some(tx) = self.tx.as_ref() else { return };
        let (ack_tx, ack_rx) = channel::bounded::<()>(1);
        if tx.send(Command::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }
}

impl Drop for CommandExecutor {
    fn drop(&mut self) {
        // 关闭通道，执行线程在处理完剩余命令后退出
        self.tx.take();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}
