pub mod migrate;
pub mod server;

// Internal "interpreter" for `Action`, kept apart so this file stays small.
mod run;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    MigratePasswords(migrate::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
