use std::io;
use std::sync::Arc;
use std::time::Duration;

use sqlnav_core::data_access::DataAccess;
use sqlnav_core::dispatcher::{Command, Message};
use sqlnav_core::error::SessionError;
use sqlnav_core::keys::Key;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

#[derive(Debug)]
pub(crate) enum Inbound {
    Key(Key),
    Tick,
    Message(Message),
    InputFailed(io::Error),
}

#[derive(Clone)]
pub(crate) struct CommandDispatcher {
    runtime: Handle,
    access: Arc<dyn DataAccess>,
    sender: UnboundedSender<Inbound>,
    timeout: Option<Duration>,
}

impl CommandDispatcher {
    pub(crate) fn new(
        runtime: Handle,
        access: Arc<dyn DataAccess>,
        sender: UnboundedSender<Inbound>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            runtime,
            access,
            sender,
            timeout,
        }
    }

    pub(crate) fn dispatch_all(&self, commands: Vec<Command>) {
        for command in commands {
            self.dispatch(command);
        }
    }

    pub(crate) fn dispatch(&self, command: Command) {
        let access = Arc::clone(&self.access);
        let sender = self.sender.clone();
        let timeout = self.timeout;
        debug!(command = command.name(), "dispatching command");

        self.runtime.spawn(async move {
            let message = run_command(command, access.as_ref(), timeout).await;
            if sender.send(Inbound::Message(message)).is_err() {
                debug!("event loop gone; dropping command result");
            }
        });
    }
}

async fn run_command(
    command: Command,
    access: &dyn DataAccess,
    timeout: Option<Duration>,
) -> Message {
    let Some(limit) = timeout else {
        return command.execute(access).await;
    };

    let name = command.name();
    match tokio::time::timeout(limit, command.execute(access)).await {
        Ok(message) => message,
        Err(_) => {
            warn!(command = name, ?limit, "command timed out");
            Message::Failed(SessionError::Connectivity(format!(
                "{name} timed out after {}s",
                limit.as_secs()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use sqlnav_core::data_access::{
        ConnectionHandle, Credentials, DataAccess, DataAccessError, TableRow,
    };
    use sqlnav_core::dispatcher::{Command, Message};
    use sqlnav_core::error::SessionError;
    use tokio::runtime::Handle;
    use tokio::sync::mpsc;

    use super::{CommandDispatcher, Inbound};

    struct SlowTables;

    #[async_trait]
    impl DataAccess for SlowTables {
        async fn check_available(&self) -> bool {
            true
        }

        async fn connect(
            &self,
            _credentials: &Credentials,
        ) -> Result<ConnectionHandle, DataAccessError> {
            Ok(ConnectionHandle::new(1))
        }

        async fn list_users(&self, _conn: ConnectionHandle) -> Result<Vec<String>, DataAccessError> {
            Ok(vec!["root".to_string()])
        }

        async fn list_databases(
            &self,
            _conn: ConnectionHandle,
        ) -> Result<Vec<String>, DataAccessError> {
            Ok(Vec::new())
        }

        async fn list_tables(&self, _conn: ConnectionHandle) -> Result<Vec<String>, DataAccessError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }

        async fn create_table(
            &self,
            _conn: ConnectionHandle,
            _name: &str,
            _column_definitions: &str,
        ) -> Result<(), DataAccessError> {
            Ok(())
        }

        async fn table_columns(
            &self,
            _conn: ConnectionHandle,
            _table: &str,
        ) -> Result<Vec<String>, DataAccessError> {
            Ok(Vec::new())
        }

        async fn table_data(
            &self,
            _conn: ConnectionHandle,
            _table: &str,
        ) -> Result<Vec<TableRow>, DataAccessError> {
            Ok(Vec::new())
        }

        async fn insert_row(
            &self,
            _conn: ConnectionHandle,
            _table: &str,
            _row: &TableRow,
        ) -> Result<(), DataAccessError> {
            Ok(())
        }

        async fn close(&self, _conn: ConnectionHandle) -> Result<(), DataAccessError> {
            Ok(())
        }
    }

    async fn next_message(receiver: &mut mpsc::UnboundedReceiver<Inbound>) -> Message {
        match receiver.recv().await {
            Some(Inbound::Message(message)) => message,
            other => panic!("expected a message, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn each_command_posts_exactly_one_message() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let dispatcher = CommandDispatcher::new(Handle::current(), Arc::new(SlowTables), sender, None);

        dispatcher.dispatch_all(vec![
            Command::CheckAvailable,
            Command::ListUsers(ConnectionHandle::new(1)),
        ]);

        let mut messages = vec![
            next_message(&mut receiver).await,
            next_message(&mut receiver).await,
        ];
        messages.sort_by_key(|message| matches!(message, Message::Users(_)));
        assert_eq!(
            messages,
            vec![
                Message::ServiceAvailable,
                Message::Users(vec!["root".to_string()])
            ]
        );
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stalled_commands_fail_after_the_timeout() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let dispatcher = CommandDispatcher::new(
            Handle::current(),
            Arc::new(SlowTables),
            sender,
            Some(Duration::from_millis(50)),
        );

        dispatcher.dispatch(Command::ListTables(ConnectionHandle::new(1)));

        let message = next_message(&mut receiver).await;
        assert!(matches!(
            message,
            Message::Failed(SessionError::Connectivity(ref reason)) if reason.contains("list_tables")
        ));
    }
}
