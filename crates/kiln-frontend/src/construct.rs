//! Graph construction for scripts, functions and statements
//!
//! SSA is built during the AST walk. Every function keeps an environment of
//! local bindings; control flow splits copy it, and joins create a phi for
//! each binding whose incoming values differ. There are no loops, so every
//! join sees all of its predecessors when it is built.

use std::collections::BTreeMap;

use kiln_ir::{Builder, BlockId, Const, Graph, HighOp, Input, InstrId, PrimOp};
use oxc_allocator::Allocator;
use oxc_ast::ast::*;
use oxc_parser::Parser;
use oxc_span::SourceType;

use crate::error::{CompileError, CompileResult};

/// Binding for the completion value of the top-level script
pub(crate) const COMPLETION: &str = "%completion";

/// Binding carrying an expression result across a join
pub(crate) const RESULT: &str = "%result";

pub(crate) type Env = BTreeMap<String, InstrId>;

/// Per-function construction state
pub(crate) struct FnState {
    pub(crate) b: Builder,
    pub(crate) env: Env,
    pub(crate) top_level: bool,
    /// The current block ended with a return
    pub(crate) done: bool,
}

impl FnState {
    fn new(name: &str, top_level: bool) -> Self {
        Self {
            b: Builder::new(name),
            env: Env::new(),
            top_level,
            done: false,
        }
    }
}

/// One incoming edge of a join
pub(crate) struct Arm {
    pub(crate) block: BlockId,
    pub(crate) env: Env,
    pub(crate) done: bool,
}

impl Arm {
    pub(crate) fn capture(f: &FnState) -> Self {
        Self {
            block: f.b.current(),
            env: f.env.clone(),
            done: f.done,
        }
    }
}

/// Builds one graph per function of a script
#[derive(Default)]
pub(crate) struct Constructor {
    graphs: Vec<Option<Graph>>,
}

/// Parse `source` and build its graphs, outermost first.
///
/// Index 0 is the top-level script; nested functions are referenced from
/// `fn` instructions by their index in the returned list.
pub fn construct(source: &str) -> CompileResult<Vec<Graph>> {
    let allocator = Allocator::default();
    let parser = Parser::new(&allocator, source, SourceType::default());
    let result = parser.parse();

    if !result.errors.is_empty() {
        let messages: Vec<String> = result.errors.iter().map(|e| e.to_string()).collect();
        return Err(CompileError::Parse(messages.join("; ")));
    }

    let mut constructor = Constructor::default();
    constructor.script(&result.program)?;
    constructor.finish()
}

impl Constructor {
    fn reserve(&mut self) -> usize {
        self.graphs.push(None);
        self.graphs.len() - 1
    }

    fn finish(self) -> CompileResult<Vec<Graph>> {
        self.graphs
            .into_iter()
            .enumerate()
            .map(|(i, g)| {
                g.ok_or_else(|| CompileError::unsupported(format!("function #{i} was never built")))
            })
            .collect()
    }

    fn script(&mut self, program: &Program) -> CompileResult<()> {
        let index = self.reserve();
        let mut f = FnState::new("script", true);
        let undefined = f.b.literal(Const::Undefined)?;
        f.env.insert(COMPLETION.to_owned(), undefined);

        self.hoist(&mut f, &program.body)?;
        self.statements(&mut f, &program.body)?;

        if !f.done {
            let value = f.env.get(COMPLETION).copied().unwrap_or(undefined);
            f.b.ret(value)?;
        }
        self.graphs[index] = Some(f.b.finish());
        Ok(())
    }

    /// Build a nested function and return its graph index
    pub(crate) fn function(
        &mut self,
        name: Option<&str>,
        params: &FormalParameters,
        body: Option<&FunctionBody>,
        expression_body: bool,
    ) -> CompileResult<usize> {
        let index = self.reserve();
        let mut f = FnState::new(name.unwrap_or("anonymous"), false);

        if params.rest.is_some() {
            return Err(CompileError::unsupported("rest parameters"));
        }
        for (i, param) in params.items.iter().enumerate() {
            match &param.pattern {
                BindingPattern::BindingIdentifier(ident) => {
                    let value = f.b.arg(i)?;
                    f.env.insert(ident.name.to_string(), value);
                }
                _ => return Err(CompileError::unsupported("Complex parameter patterns")),
            }
        }
        f.b.graph_mut().set_params(params.items.len());

        if let Some(body) = body {
            if expression_body {
                // Arrow functions with an expression body hold it as a
                // single expression statement.
                if let Some(Statement::ExpressionStatement(stmt)) = body.statements.first() {
                    let value = self.expression(&mut f, &stmt.expression)?;
                    f.b.ret(value)?;
                    f.done = true;
                }
            } else {
                self.hoist(&mut f, &body.statements)?;
                self.statements(&mut f, &body.statements)?;
            }
        }

        if !f.done {
            let undefined = f.b.literal(Const::Undefined)?;
            f.b.ret(undefined)?;
        }
        self.graphs[index] = Some(f.b.finish());
        Ok(index)
    }

    /// Bind function declarations before the statements that use them
    fn hoist(&mut self, f: &mut FnState, statements: &[Statement]) -> CompileResult<()> {
        for stmt in statements {
            if let Statement::FunctionDeclaration(func) = stmt {
                let name = func.id.as_ref().map(|id| id.name.to_string());
                let index = self.function(
                    name.as_deref(),
                    &func.params,
                    func.body.as_deref(),
                    false,
                )?;
                let closure = f.b.emit(HighOp::Fn, [Input::Const(Const::Function(index))])?;
                if let Some(name) = name {
                    self.bind(f, &name, closure)?;
                }
            }
        }
        Ok(())
    }

    /// Declare `name`: a global at the top level, a local elsewhere
    pub(crate) fn bind(&mut self, f: &mut FnState, name: &str, value: InstrId) -> CompileResult<()> {
        if f.top_level {
            f.b.emit(
                HighOp::StoreGlobal,
                [Input::Const(Const::Str(name.to_owned())), Input::Value(value)],
            )?;
        } else {
            f.env.insert(name.to_owned(), value);
        }
        Ok(())
    }

    fn statements(&mut self, f: &mut FnState, statements: &[Statement]) -> CompileResult<()> {
        for stmt in statements {
            if f.done {
                break;
            }
            self.statement(f, stmt)?;
        }
        Ok(())
    }

    fn statement(&mut self, f: &mut FnState, stmt: &Statement) -> CompileResult<()> {
        match stmt {
            Statement::ExpressionStatement(expr_stmt) => {
                let value = self.expression(f, &expr_stmt.expression)?;
                if f.top_level {
                    f.env.insert(COMPLETION.to_owned(), value);
                }
                Ok(())
            }

            Statement::VariableDeclaration(decl) => {
                for declarator in &decl.declarations {
                    let BindingPattern::BindingIdentifier(ident) = &declarator.id else {
                        return Err(CompileError::unsupported("Destructuring declarations"));
                    };
                    let value = match &declarator.init {
                        Some(init) => self.expression(f, init)?,
                        None => f.b.literal(Const::Undefined)?,
                    };
                    self.bind(f, &ident.name, value)?;
                }
                Ok(())
            }

            Statement::ReturnStatement(ret) => {
                let value = match &ret.argument {
                    Some(arg) => self.expression(f, arg)?,
                    None => f.b.literal(Const::Undefined)?,
                };
                f.b.ret(value)?;
                f.done = true;
                Ok(())
            }

            Statement::BlockStatement(block) => {
                self.hoist(f, &block.body)?;
                self.statements(f, &block.body)
            }

            Statement::IfStatement(if_stmt) => self.if_statement(f, if_stmt),

            // Hoisted
            Statement::FunctionDeclaration(_) => Ok(()),

            Statement::EmptyStatement(_) => Ok(()),

            Statement::DebuggerStatement(_) => {
                f.b.emit(PrimOp::Brk, [])?;
                Ok(())
            }

            Statement::WhileStatement(_)
            | Statement::DoWhileStatement(_)
            | Statement::ForStatement(_)
            | Statement::ForInStatement(_)
            | Statement::ForOfStatement(_) => Err(CompileError::unsupported("Loops")),

            _ => Err(CompileError::unsupported("Unknown statement type")),
        }
    }

    fn if_statement(&mut self, f: &mut FnState, stmt: &IfStatement) -> CompileResult<()> {
        let test = self.expression(f, &stmt.test)?;
        let (then_block, else_block) = self.split(f, test)?;
        let before = f.env.clone();

        f.b.switch_to(then_block);
        self.statement(f, &stmt.consequent)?;
        let then_arm = Arm::capture(f);

        f.env = before;
        f.done = false;
        f.b.switch_to(else_block);
        if let Some(alternate) = &stmt.alternate {
            self.statement(f, alternate)?;
        }
        let else_arm = Arm::capture(f);

        self.join(f, vec![then_arm, else_arm])
    }

    /// End the current block with a branch on `test`
    pub(crate) fn split(&mut self, f: &mut FnState, test: InstrId) -> CompileResult<(BlockId, BlockId)> {
        f.b.emit(HighOp::Branch, [Input::Value(test)])?;
        let if_true = f.b.new_block();
        let if_false = f.b.new_block();
        f.b.branch(if_true, if_false)?;
        Ok((if_true, if_false))
    }

    /// Merge `arms` into a fresh block and continue there
    pub(crate) fn join(&mut self, f: &mut FnState, arms: Vec<Arm>) -> CompileResult<()> {
        let live: Vec<Arm> = arms.into_iter().filter(|a| !a.done).collect();
        if live.is_empty() {
            f.done = true;
            return Ok(());
        }

        let join = f.b.new_block();
        for arm in &live {
            f.b.graph_mut().set_successors(arm.block, &[join])?;
        }

        let mut names: Vec<&String> = live.iter().flat_map(|a| a.env.keys()).collect();
        names.sort();
        names.dedup();

        let mut merged = Env::new();
        for name in names {
            let incoming: Vec<Option<InstrId>> =
                live.iter().map(|a| a.env.get(name).copied()).collect();
            if let Some(first) = incoming[0] {
                if incoming.iter().all(|v| *v == Some(first)) {
                    merged.insert(name.clone(), first);
                    continue;
                }
            }

            let phi = f.b.phi(join)?;
            for (arm, value) in live.iter().zip(incoming) {
                let graph = f.b.graph_mut();
                let value = match value {
                    Some(v) => v,
                    None => graph.append(
                        arm.block,
                        PrimOp::Literal,
                        [Input::Const(Const::Undefined)],
                    )?,
                };
                graph.append(
                    arm.block,
                    PrimOp::ToPhi,
                    [Input::Value(phi), Input::Value(value)],
                )?;
            }
            merged.insert(name.clone(), phi);
        }

        f.env = merged;
        f.done = false;
        f.b.switch_to(join);
        Ok(())
    }
}
