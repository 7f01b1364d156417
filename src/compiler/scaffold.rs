use crate::ast::{
    BlockKind, Capture, EngineCall, Node, Origin, Statement, StatusSource, Target, TracePhase,
};

/// Injects status checking, and tracing in debug mode, around engine calls.
///
/// Bare engine calls become guard blocks whose status lives in a block-scoped
/// local. Assignments to the pipeline status are followed by a status check,
/// conditional ones included. Calls inside conditionals and explicitly
/// captured calls are left alone.
pub(super) struct Scaffolder {
    debug: bool,
    next_slot: usize,
}

impl Scaffolder {
    pub(super) fn new(debug: bool) -> Self {
        Self {
            debug,
            next_slot: 0,
        }
    }

    pub(super) fn scaffold(&mut self, nodes: Vec<Node>) -> Vec<Node> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            let Node {
                position,
                origin,
                statement,
            } = node;
            match statement {
                Statement::EngineCall(call) if call.capture == Capture::Unguarded => {
                    out.push(self.guard(origin, call));
                }
                Statement::EngineCall(call) if call.capture == Capture::Status => {
                    let check = Node::new(origin.clone(), Self::status_check());
                    out.push(Node {
                        position,
                        origin,
                        statement: Statement::EngineCall(call),
                    });
                    out.push(check);
                }
                Statement::Assign {
                    target: Target::Status,
                    value,
                } => {
                    let check = Node::new(origin.clone(), Self::status_check());
                    out.push(Node {
                        position,
                        origin,
                        statement: Statement::Assign {
                            target: Target::Status,
                            value,
                        },
                    });
                    out.push(check);
                }
                Statement::Conditional { condition, then } => {
                    let writes_status = Self::writes_status(&then.statement);
                    let check = Node::new(origin.clone(), Self::status_check());
                    out.push(Node {
                        position,
                        origin,
                        statement: Statement::Conditional { condition, then },
                    });
                    if writes_status {
                        out.push(check);
                    }
                }
                Statement::Block { kind, body } => out.push(Node {
                    position,
                    origin,
                    statement: Statement::Block {
                        kind,
                        body: self.scaffold(body),
                    },
                }),
                statement => out.push(Node {
                    position,
                    origin,
                    statement,
                }),
            }
        }
        out
    }

    fn writes_status(statement: &Statement) -> bool {
        matches!(
            statement,
            Statement::Assign {
                target: Target::Status,
                ..
            }
        ) || matches!(statement, Statement::EngineCall(call) if call.capture == Capture::Status)
    }

    fn status_check() -> Statement {
        Statement::StatusCheck {
            source: StatusSource::Status,
        }
    }

    fn guard(&mut self, origin: Origin, mut call: EngineCall) -> Node {
        let slot = format!("__status_{}", self.next_slot);
        self.next_slot += 1;
        call.capture = Capture::Local(slot.clone());

        let site = call.site();
        let mut body = Vec::with_capacity(4);
        if self.debug {
            body.push(Node::new(
                origin.clone(),
                Statement::Trace {
                    phase: TracePhase::Before,
                    call: site.clone(),
                    slot: slot.clone(),
                },
            ));
        }
        body.push(Node::new(origin.clone(), Statement::EngineCall(call)));
        if self.debug {
            body.push(Node::new(
                origin.clone(),
                Statement::Trace {
                    phase: TracePhase::After,
                    call: site,
                    slot: slot.clone(),
                },
            ));
        }
        body.push(Node::new(
            origin.clone(),
            Statement::StatusCheck {
                source: StatusSource::Local(slot),
            },
        ));
        Node::new(
            origin,
            Statement::Block {
                kind: BlockKind::Guard,
                body,
            },
        )
    }
}

/// Assigns listing positions depth first, nested nodes included.
pub(super) fn number(nodes: &mut [Node], next: &mut usize) {
    for node in nodes {
        node.position = *next;
        *next += 1;
        match &mut node.statement {
            Statement::Block { body, .. } => number(body, next),
            Statement::Conditional { then, .. } => number(std::slice::from_mut(then.as_mut()), next),
            _ => {}
        }
    }
}
