//! Abstract Syntax Tree for core descriptions.

use crate::symbolic::Expr;

/// A parsed core description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoreAst {
    /// Model label (`.label`)
    pub label: Option<String>,
    pub constants: Vec<ConstDef>,
    pub parameters: Vec<ParamDef>,
    pub storages: Vec<StorageDef>,
    pub dissipations: Vec<DissipationDef>,
    pub ports: Vec<PortDef>,
    pub connections: Vec<ConnectionDef>,
    pub entries: Vec<EntryDef>,
}

impl CoreAst {
    /// Create an empty AST.
    pub fn new() -> Self {
        Self::default()
    }
}

/// `.const NAME VALUE`
#[derive(Debug, Clone, PartialEq)]
pub struct ConstDef {
    pub name: String,
    pub value: f64,
    pub line: usize,
}

/// `.param NAME`
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    pub name: String,
    pub line: usize,
}

/// `.storage NAME = EXPR`: state `NAME`, storage term `EXPR`.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageDef {
    pub name: String,
    pub hamiltonian: Expr,
    pub line: usize,
}

/// `.dissip NAME = EXPR`: dissipation variable `NAME`, law `z = EXPR`.
#[derive(Debug, Clone, PartialEq)]
pub struct DissipationDef {
    pub name: String,
    pub law: Expr,
    pub line: usize,
}

/// `.port INPUT OUTPUT`
#[derive(Debug, Clone, PartialEq)]
pub struct PortDef {
    pub input: String,
    pub output: String,
    pub line: usize,
}

/// `.connect A B [COEF]`: skew-symmetric pair `M[A,B] = COEF`,
/// `M[B,A] = -COEF`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionDef {
    pub from: String,
    pub to: String,
    pub coef: Expr,
    pub line: usize,
}

/// `.entry A B EXPR`: single structure-matrix entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryDef {
    pub row: String,
    pub col: String,
    pub value: Expr,
    pub line: usize,
}
