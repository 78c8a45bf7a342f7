use vaultdb_core::SecretStoreOutcome;

use crate::app::AppContext;

pub fn handle_forget(ctx: &AppContext) -> anyhow::Result<()> {
    let service = ctx.service()?;
    match service.forget_key() {
        SecretStoreOutcome::Failed => Err(anyhow::anyhow!(
            "Could not remove the remembered key from {}",
            service.secret_store_name()
        )),
        SecretStoreOutcome::Skipped => {
            if !ctx.quiet() {
                println!("No secret store is available on this device; nothing to forget.");
            }
            Ok(())
        }
        _ => {
            if !ctx.quiet() {
                println!("Remembered key removed.");
            }
            Ok(())
        }
    }
}
