use crate::prim::{Graph, NodeId};
use std::fmt;

/// One branch decision on a condition path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Condition {
    pub expr: NodeId,
    /// `true` selects the then-branch.
    pub polarity: bool,
}

impl Condition {
    pub fn when(expr: NodeId) -> Self {
        Self {
            expr,
            polarity: true,
        }
    }

    pub fn unless(expr: NodeId) -> Self {
        Self {
            expr,
            polarity: false,
        }
    }

    pub fn negate(self) -> Self {
        Self {
            expr: self.expr,
            polarity: !self.polarity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Assign {
        storage: NodeId,
        lvalue: NodeId,
        rvalue: NodeId,
    },
    If {
        cond: NodeId,
        then_block: Block,
        else_block: Block,
    },
}

/// Ordered conditional assignments. Later statements override earlier ones
/// for the same location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub statements: Vec<Statement>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Appends an assignment under `path`. A path that continues the most
    /// recently opened condition reuses that branch instead of opening a
    /// duplicate one.
    pub fn add(&mut self, path: &[Condition], storage: NodeId, lvalue: NodeId, rvalue: NodeId) {
        let Some((first, rest)) = path.split_first() else {
            self.statements.push(Statement::Assign {
                storage,
                lvalue,
                rvalue,
            });
            return;
        };
        let reuse = matches!(
            self.statements.last(),
            Some(Statement::If { cond, .. }) if *cond == first.expr
        );
        if !reuse {
            self.statements.push(Statement::If {
                cond: first.expr,
                then_block: Block::new(),
                else_block: Block::new(),
            });
        }
        let Some(Statement::If {
            then_block,
            else_block,
            ..
        }) = self.statements.last_mut()
        else {
            unreachable!("an if statement was just ensured");
        };
        let branch = if first.polarity {
            then_block
        } else {
            else_block
        };
        branch.add(rest, storage, lvalue, rvalue);
    }

    /// Appends every statement of `other`.
    pub fn extend(&mut self, other: Block) {
        self.statements.extend(other.statements);
    }

    /// Calls `f` for every statement, outer statements before nested ones.
    pub fn visit(&self, f: &mut impl FnMut(&Statement)) {
        for statement in &self.statements {
            f(statement);
            if let Statement::If {
                then_block,
                else_block,
                ..
            } = statement
            {
                then_block.visit(f);
                else_block.visit(f);
            }
        }
    }

    /// Storage elements written anywhere in the block, first write first.
    pub fn written_storage(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.visit(&mut |s| {
            if let Statement::Assign { storage, .. } = s {
                if !out.contains(storage) {
                    out.push(*storage);
                }
            }
        });
        out
    }

    pub fn display<'a>(&'a self, graph: &'a Graph) -> BlockDisplay<'a> {
        BlockDisplay {
            block: self,
            graph,
            indent: 0,
        }
    }
}

pub struct BlockDisplay<'a> {
    block: &'a Block,
    graph: &'a Graph,
    indent: usize,
}

impl<'a> BlockDisplay<'a> {
    fn nested(&self, block: &'a Block) -> BlockDisplay<'a> {
        BlockDisplay {
            block,
            graph: self.graph,
            indent: self.indent + 1,
        }
    }
}

impl fmt::Display for BlockDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pad = "    ".repeat(self.indent);
        for statement in &self.block.statements {
            match statement {
                Statement::Assign { lvalue, rvalue, .. } => writeln!(
                    f,
                    "{pad}{} = {};",
                    self.graph.display(*lvalue),
                    self.graph.display(*rvalue)
                )?,
                Statement::If {
                    cond,
                    then_block,
                    else_block,
                } => {
                    writeln!(f, "{pad}if {} {{", self.graph.display(*cond))?;
                    write!(f, "{}", self.nested(then_block))?;
                    if !else_block.is_empty() {
                        writeln!(f, "{pad}}} else {{")?;
                        write!(f, "{}", self.nested(else_block))?;
                    }
                    writeln!(f, "{pad}}}")?;
                }
            }
        }
        Ok(())
    }
}
