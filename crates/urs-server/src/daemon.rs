//! Service bootstrap.

use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::Context;
use tracing::{info, warn};
use urs_kernel::urs_types::MailboxId;
use urs_kernel::{
    CapabilityTable, DevProvider, MailboxRouter, MemoryProvider, Urs, UrsConfig, remote,
};

/// Mailbox the `vfs://tmp/` provider listens on.
pub const TMP_MAILBOX: MailboxId = MailboxId(1);

/// Opcode carried by every request to the `vfs://tmp/` provider.
const TMP_OPCODE: u32 = 0x7470;

/// A running service with its provider threads.
pub struct Daemon {
    urs: Urs,
    router: Arc<MailboxRouter>,
    tmp_server: Option<JoinHandle<()>>,
}

impl Daemon {
    /// Mount `vfs://dev/` locally and `vfs://tmp/` behind a mailbox.
    pub fn boot(config: UrsConfig) -> anyhow::Result<Self> {
        let router = Arc::new(
            MailboxRouter::from_config(&config).context("failed to build mailbox router")?,
        );
        let urs = Urs::new(config, router.clone());

        let dev = Arc::new(DevProvider::new());
        urs.register("/dev", "dev", 0, CapabilityTable::all_local(dev))?;

        let mailbox = router.bind(TMP_MAILBOX)?;
        let tmp_server = remote::spawn(mailbox, Arc::new(MemoryProvider::new()))
            .context("failed to start tmp provider thread")?;
        urs.register("/tmp", "tmp", 0, CapabilityTable::all_remote(TMP_MAILBOX, TMP_OPCODE))?;

        info!(
            mounts = urs.mounts().len(),
            scheme = %urs.config().default_scheme,
            "ursd ready"
        );
        Ok(Self {
            urs,
            router,
            tmp_server: Some(tmp_server),
        })
    }

    pub fn urs(&self) -> &Urs {
        &self.urs
    }

    /// Close the tmp mailbox and wait for its thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(server) = self.tmp_server.take() else {
            return;
        };
        self.router.unbind(TMP_MAILBOX);
        if server.join().is_err() {
            warn!(mailbox = %TMP_MAILBOX, "tmp provider thread panicked");
        }
        info!("ursd stopped");
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        self.stop();
    }
}
