use super::arguments::parse_arguments;
use super::scope::ScopeStack;
use crate::ast::{
    BlockKind, Capture, EngineCall, Expression, InputSource, Node, ObjectField, ObjectRef,
    RunFlag, Statement, StatusSource, Target, TracePhase, Value,
};
use crate::context::{DataObject, RunContext};
use crate::dispatch::Status;
use crate::error::{EvaluationError, ExecutionError, HeaderError, PipelineError};
use crate::evaluator::{self, Bindings};
use crate::recipe::CompiledUnit;
use ahash::AHashMap;
use tracing::{debug, info, warn};

/// What last wrote the pipeline status, used to name the culprit of a failed check.
#[derive(Debug, Clone)]
struct StatusWriter {
    engine: String,
    action: String,
    args: String,
}

/// Walks the statements of one compiled unit against a run context.
pub(super) struct Interpreter<'u, 'c> {
    unit: &'u CompiledUnit,
    ctx: &'c mut RunContext,
    scopes: ScopeStack,
    status: Status,
    status_writer: Option<StatusWriter>,
    calls: AHashMap<String, StatusWriter>,
    pub(super) current: Option<&'u Node>,
    pub(super) statements: usize,
    pub(super) engine_calls: usize,
    pub(super) trace: Vec<String>,
}

impl<'u, 'c> Interpreter<'u, 'c> {
    pub(super) fn new(unit: &'u CompiledUnit, ctx: &'c mut RunContext) -> Self {
        let parameters = unit
            .parameters
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            unit,
            ctx,
            scopes: ScopeStack::new(parameters),
            status: Status::OK,
            status_writer: None,
            calls: AHashMap::new(),
            current: None,
            statements: 0,
            engine_calls: 0,
            trace: Vec::new(),
        }
    }

    pub(super) fn status(&self) -> Status {
        self.status
    }

    fn batch(&self) -> bool {
        self.unit.batch || self.ctx.flags.batch
    }

    pub(super) fn run(&mut self) -> Result<Status, ExecutionError> {
        let unit = self.unit;
        self.run_nodes(&unit.nodes)?;
        Ok(self.status)
    }

    fn run_nodes(&mut self, nodes: &'u [Node]) -> Result<(), ExecutionError> {
        for node in nodes {
            self.current = Some(node);
            self.statements += 1;
            self.exec(node)?;
        }
        Ok(())
    }

    fn eval(&self, expression: &Expression) -> Result<Value, ExecutionError> {
        Ok(evaluator::evaluate(expression, self)?)
    }

    fn eval_text(&self, expression: &Option<Expression>) -> Result<String, ExecutionError> {
        match expression {
            Some(e) => Ok(self.eval(e)?.to_string()),
            None => Ok(String::new()),
        }
    }

    fn check_termination(&self) -> Result<(), ExecutionError> {
        if self.ctx.termination.is_requested() {
            return Err(ExecutionError::Terminated);
        }
        Ok(())
    }

    fn object_mut(&mut self, object: ObjectRef) -> &mut DataObject {
        match object {
            ObjectRef::Frame => &mut self.ctx.frame,
            ObjectRef::Group => &mut self.ctx.group,
        }
    }

    fn object(&self, object: ObjectRef) -> &DataObject {
        match object {
            ObjectRef::Frame => &self.ctx.frame,
            ObjectRef::Group => &self.ctx.group,
        }
    }

    fn exec(&mut self, node: &'u Node) -> Result<(), ExecutionError> {
        match &node.statement {
            Statement::Raw(_) => Ok(()),
            Statement::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value, node)
            }
            Statement::EngineCall(call) => self.obey(call),
            Statement::Trace { phase, call, slot } => {
                let line = match phase {
                    TracePhase::Before => format!("-> {}", call),
                    TracePhase::After => {
                        let status = self.scopes.get(slot).cloned().unwrap_or(Value::Null);
                        format!("<- {} {} status {}", call.engine, call.action, status)
                    }
                };
                debug!(target: "kansoku::trace", "{}", line);
                self.trace.push(line);
                Ok(())
            }
            Statement::StatusCheck { source } => self.check_status(source),
            Statement::Block { kind, body } => {
                let arguments = match kind {
                    BlockKind::Primitive {
                        name, arguments, ..
                    } => {
                        let text = self.eval(arguments)?.to_string();
                        let parsed = parse_arguments(&text).map_err(|message| {
                            ExecutionError::MalformedArguments {
                                primitive: name.clone(),
                                message,
                            }
                        })?;
                        Some(parsed)
                    }
                    BlockKind::Guard => None,
                };
                self.scopes.push(arguments);
                let result = self.run_nodes(body);
                self.scopes.pop();
                result
            }
            Statement::Conditional { condition, then } => {
                if self.eval(condition)?.is_truthy() {
                    self.run_nodes(std::slice::from_ref(then.as_ref()))?;
                }
                Ok(())
            }
            Statement::Print(e) => {
                let message = self.eval(e)?;
                info!(target: "kansoku::recipe", "{}", message);
                Ok(())
            }
            Statement::Warn(e) => {
                let message = self.eval(e)?;
                warn!(target: "kansoku::recipe", "{}", message);
                Ok(())
            }
            Statement::Throw(e) => Err(ExecutionError::Thrown(self.eval(e)?.to_string())),
            Statement::Display(e) => self.display(e),
            Statement::Index { kind } => {
                let file = self
                    .ctx
                    .frame
                    .file()
                    .ok_or(HeaderError::NoFile)?
                    .to_string();
                let header = self.ctx.frame.merged_header();
                self.ctx.calibration.file(kind, &file, &header)?;
                info!(kind = %kind, file = %file, "filed calibration");
                Ok(())
            }
            Statement::Sync(object) => {
                let ctx = &mut *self.ctx;
                let provider = ctx.headers.as_deref().ok_or(HeaderError::NoProvider)?;
                let target = match object {
                    ObjectRef::Frame => &mut ctx.frame,
                    ObjectRef::Group => &mut ctx.group,
                };
                target.refresh(provider, &ctx.translations)?;
                Ok(())
            }
        }
    }

    fn assign(&mut self, target: &Target, value: Value, node: &Node) -> Result<(), ExecutionError> {
        match target {
            Target::Variable(name) => self.scopes.set(name, value),
            Target::Status => {
                self.status = status_code(&value, "status assignment")?;
                self.status_writer = Some(StatusWriter {
                    engine: "status".to_string(),
                    action: "assignment".to_string(),
                    args: node.statement.describe(),
                });
            }
            Target::Object { object, field } => {
                let object = self.object_mut(*object);
                match field {
                    ObjectField::File => object.set_file(&value.to_string()),
                    ObjectField::Header(key) => {
                        object.hdr.insert(key.clone(), value);
                    }
                    ObjectField::UserHeader(key) => {
                        object.uhdr.insert(key.clone(), value);
                    }
                }
            }
            Target::Calibration { kind } => {
                self.ctx.calibration.set_override(kind, &value.to_string())
            }
        }
        Ok(())
    }

    fn obey(&mut self, call: &EngineCall) -> Result<(), ExecutionError> {
        self.check_termination()?;
        let args = self.eval_text(&call.args)?;
        let status = self.ctx.engines.invoke(&call.engine, &call.action, &args)?;
        self.engine_calls += 1;
        if status == Status::TERMINATED {
            return Err(ExecutionError::Terminated);
        }

        let writer = StatusWriter {
            engine: call.engine.clone(),
            action: call.action.clone(),
            args,
        };
        let code = Value::Number(f64::from(status.code()));
        match &call.capture {
            Capture::Local(slot) => {
                self.scopes.set(slot, code);
                self.calls.insert(slot.clone(), writer);
            }
            Capture::Variable(name) => self.scopes.set(name, code),
            Capture::Status => {
                self.status = status;
                self.status_writer = Some(writer);
            }
            Capture::Unguarded | Capture::Ignore => {}
        }
        Ok(())
    }

    fn check_status(&mut self, source: &StatusSource) -> Result<(), ExecutionError> {
        self.check_termination()?;
        let (status, writer) = match source {
            StatusSource::Status => (self.status, self.status_writer.clone()),
            StatusSource::Local(slot) => {
                let value = self
                    .scopes
                    .get(slot)
                    .ok_or_else(|| EvaluationError::UndefinedVariable(slot.clone()))?;
                let status = status_code(value, "status check")?;
                (status, self.calls.remove(slot))
            }
        };
        if status == Status::TERMINATED {
            return Err(ExecutionError::Terminated);
        }
        if status.is_ok() {
            return Ok(());
        }
        let writer = writer.unwrap_or(StatusWriter {
            engine: "status".to_string(),
            action: "assignment".to_string(),
            args: String::new(),
        });
        Err(PipelineError {
            engine: writer.engine,
            action: writer.action,
            args: writer.args,
            status: status.code(),
        }
        .into())
    }

    fn display(&mut self, expression: &Expression) -> Result<(), ExecutionError> {
        let file = self.eval(expression)?.to_string();
        if self.batch() {
            debug!(file = %file, "display skipped in batch mode");
            return Ok(());
        }
        let header = self.ctx.frame.merged_header();
        match self.ctx.display.as_mut() {
            Some(display) => display
                .display(&file, &header)
                .map_err(ExecutionError::Display),
            None => {
                debug!(file = %file, "no display attached");
                Ok(())
            }
        }
    }
}

impl Bindings for Interpreter<'_, '_> {
    fn resolve(&self, source: &InputSource) -> Result<Value, EvaluationError> {
        match source {
            InputSource::Variable { name } if name == "status" => {
                Ok(Value::Number(f64::from(self.status.code())))
            }
            InputSource::Variable { name } => self
                .scopes
                .get(name)
                .cloned()
                .ok_or_else(|| EvaluationError::UndefinedVariable(name.clone())),
            InputSource::Argument { name } => self
                .scopes
                .argument(name)
                .cloned()
                .ok_or_else(|| EvaluationError::UndefinedArgument(name.clone())),
            InputSource::Object { object, field } => {
                let data = self.object(*object);
                match field {
                    ObjectField::File => Ok(data
                        .file()
                        .map(|f| Value::Str(f.to_string()))
                        .unwrap_or(Value::Null)),
                    ObjectField::Header(key) => {
                        data.hdr
                            .get(key)
                            .cloned()
                            .ok_or_else(|| EvaluationError::MissingHeader {
                                object: format!("{}.hdr", object.prefix()),
                                key: key.clone(),
                            })
                    }
                    ObjectField::UserHeader(key) => {
                        data.uhdr
                            .get(key)
                            .cloned()
                            .ok_or_else(|| EvaluationError::MissingHeader {
                                object: format!("{}.uhdr", object.prefix()),
                                key: key.clone(),
                            })
                    }
                }
            }
            InputSource::Calibration { kind } => self
                .ctx
                .calibration
                .select(kind, &self.ctx.frame.merged_header())
                .map(Value::Str)
                .map_err(|e| EvaluationError::Calibration {
                    kind: kind.clone(),
                    source: Box::new(e),
                }),
            InputSource::Flag(RunFlag::Debug) => Ok(Value::Bool(self.ctx.flags.debug)),
            InputSource::Flag(RunFlag::Batch) => Ok(Value::Bool(self.batch())),
            InputSource::Header { .. } | InputSource::Candidate => {
                Err(EvaluationError::UnsupportedInput(source.to_string()))
            }
        }
    }
}

/// Converts a value into a status code. Only whole numbers within the `i32`
/// range are accepted.
fn status_code(value: &Value, operation: &str) -> Result<Status, EvaluationError> {
    match value.as_number() {
        Some(n) if n.fract() == 0.0 && n >= f64::from(i32::MIN) && n <= f64::from(i32::MAX) => {
            Ok(Status(n as i32))
        }
        _ => Err(EvaluationError::TypeMismatch {
            operation: operation.to_string(),
            expected: "Integer".to_string(),
            found: value.clone(),
        }),
    }
}
