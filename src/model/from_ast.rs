//! Building a core from a parsed description.

use tracing::debug;

use super::PhsCore;
use crate::dsl::CoreAst;
use crate::error::Result;

impl PhsCore {
    /// Build a core from a parsed description.
    ///
    /// Declarations are processed before structure entries, so directives
    /// may appear in any order in the source.
    pub fn from_ast(ast: &CoreAst) -> Result<Self> {
        let mut core = PhsCore::new(ast.label.clone().unwrap_or_else(|| "core".to_string()));

        for c in &ast.constants {
            core.set_const(&c.name, c.value)?;
        }
        for p in &ast.parameters {
            core.add_parameter(&p.name)?;
        }
        for s in &ast.storages {
            core.add_storage(&s.name, s.hamiltonian.clone())?;
        }
        for d in &ast.dissipations {
            core.add_dissipation(&d.name, d.law.clone())?;
        }
        for port in &ast.ports {
            core.add_port(&port.input, &port.output)?;
        }
        for c in &ast.connections {
            core.connect(&c.from, &c.to, c.coef.clone())?;
        }
        for e in &ast.entries {
            core.set_entry(&e.row, &e.col, e.value.clone())?;
        }

        debug!(label = core.label(), dims = ?core.dims(), "core built from description");
        Ok(core)
    }
}
