//! The relayer executable: the one place that decides which modules ship.

#![deny(clippy::nursery, clippy::pedantic, warnings)]

use ibc_relayer_core::Module;
use ibc_relayer_ethereum::EthereumModule;
use ibc_relayer_hd_signer::HdModule;
use ibc_relayer_mock_prover::MockModule;

/// The modules compiled into the relayer, in registration order.
#[must_use]
pub fn modules() -> Vec<Box<dyn Module>> {
    vec![
        Box::new(EthereumModule),
        Box::new(HdModule),
        Box::new(MockModule),
    ]
}

#[cfg(test)]
mod tests {
    use ibc_relayer_core::{CommandPath, Framework, Role};

    use super::*;

    #[test]
    fn shipped_modules_compose() {
        let app = modules()
            .into_iter()
            .fold(Framework::new("relayer"), Framework::with_boxed_module)
            .build()
            .unwrap();

        let registry = app.registry();
        assert_eq!(registry.identifiers(Role::Chain), ["ethereum"]);
        assert_eq!(registry.identifiers(Role::Signer), ["hd"]);
        assert_eq!(registry.identifiers(Role::Prover), ["mock"]);

        assert_eq!(
            app.tree().owner(&CommandPath::from(["ethereum", "height"])),
            Some("ethereum")
        );
        assert_eq!(
            app.tree().owner(&CommandPath::from(["hd", "address"])),
            Some("hd")
        );
    }
}
