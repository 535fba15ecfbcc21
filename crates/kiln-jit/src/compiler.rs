//! Compiler orchestration
//!
//! Every unit (script function, stub or inline cache) goes through the same
//! pipeline: `optimize` (reserved, currently a no-op), platform lowering,
//! Cranelift code generation, and finally a Code object on the heap.

use cranelift_codegen::ir::{self, AbiParam, Signature, UserFuncName, types};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_codegen::Context;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module, default_libcall_names};
use kiln_heap::{CodeRecord, ScopeGuard, Value};
use kiln_ir::Graph;
use tracing::{debug, info};

use crate::codegen::{self, CodegenUnit};
use crate::config::OptLevel;
use crate::context::{CompileContext, UnitKind};
use crate::error::{JitError, JitResult};
use crate::lower::lower;
use crate::runtime::RuntimeInner;
use crate::stubs::{Stub, StubSource};

/// Target used for IR dumps
const TRACE: &str = "kiln::trace";

/// Cranelift JIT module shared by every unit of a runtime
pub(crate) struct Backend {
    module: JITModule,
    signature: Signature,
    next_function_id: u64,
}

impl Backend {
    pub(crate) fn new(opt_level: OptLevel) -> JitResult<Self> {
        let mut flags = settings::builder();
        for (name, value) in [
            ("use_colocated_libcalls", "false"),
            ("is_pic", "false"),
            ("opt_level", opt_level.as_str()),
        ] {
            flags
                .set(name, value)
                .map_err(|e| JitError::Builder(format!("{name}={value}: {e}")))?;
        }
        let isa = cranelift_native::builder()
            .map_err(|e| JitError::Builder(e.to_string()))?
            .finish(settings::Flags::new(flags))
            .map_err(|e| JitError::Builder(e.to_string()))?;
        let module = JITModule::new(JITBuilder::with_isa(isa, default_libcall_names()));

        // (ctx, callee, this, argv, argc) -> value
        let mut signature = module.make_signature();
        for _ in 0..5 {
            signature.params.push(AbiParam::new(types::I64));
        }
        signature.returns.push(AbiParam::new(types::I64));

        Ok(Self {
            module,
            signature,
            next_function_id: 0,
        })
    }

    pub(crate) fn signature(&self) -> &Signature {
        &self.signature
    }

    fn declare(&mut self, unit: &str) -> JitResult<FuncId> {
        let name = format!(
            "kiln_{}_{}",
            unit.replace(|c: char| !c.is_ascii_alphanumeric(), "_"),
            self.next_function_id
        );
        self.next_function_id = self.next_function_id.saturating_add(1);
        Ok(self
            .module
            .declare_function(&name, Linkage::Local, &self.signature)?)
    }

    /// Compile `context` and return the entry address and code size
    fn define(&mut self, id: FuncId, context: &mut Context) -> JitResult<(usize, usize)> {
        self.module.define_function(id, context)?;
        let size = context
            .compiled_code()
            .map(|code| code.code_buffer().len())
            .unwrap_or(0);
        self.module.clear_context(context);
        self.module.finalize_definitions()?;
        let entry = self.module.get_finalized_function(id);
        Ok((entry as usize, size))
    }
}

/// Run the pipeline on one graph and return its Code object.
///
/// `nested` holds the Code objects of the functions `graph` references by
/// index. No heap or module borrow is held while code is generated, since
/// materialising constants may compile stubs and inline caches.
pub(crate) fn compile_unit(
    rt: &RuntimeInner,
    mut graph: Graph,
    kind: UnitKind,
    nested: &[Option<Value>],
) -> JitResult<Value> {
    let outer = rt.contexts.current().map(|context| context.unit);
    let guard = rt.contexts.enter(CompileContext {
        unit: graph.name().to_owned(),
        kind,
    });
    let trace = rt.config.trace;
    let unit = graph.name().to_owned();

    if trace.cfg {
        info!(target: TRACE, %unit, %kind, stage = "cfg", "\n{graph}");
    }
    optimize(&mut graph);
    if trace.opt {
        info!(target: TRACE, %unit, %kind, stage = "opt", "\n{graph}");
    }
    lower(&mut graph)?;
    if trace.lowered {
        info!(target: TRACE, %unit, %kind, stage = "lowered", "\n{graph}");
    }

    let id = rt.backend()?.declare(&unit)?;
    let mut func = ir::Function::with_name_signature(
        UserFuncName::user(0, id.as_u32()),
        rt.signature.clone(),
    );
    let record = codegen::emit(
        &CodegenUnit {
            rt,
            graph: &graph,
            nested,
            brk: rt.config.brk,
        },
        &mut func,
        &rt.signature,
    )?;
    if trace.clif {
        info!(target: TRACE, %unit, %kind, stage = "clif", "\n{}", func.display());
    }

    let mut context = Context::for_function(func);
    let (entry, size) = rt.backend()?.define(id, &mut context)?;
    debug!(
        %unit,
        %kind,
        depth = guard.depth(),
        outer = outer.as_deref().unwrap_or("-"),
        size,
        instrs = graph.instr_count(),
        "compiled"
    );
    Ok(rt.heap()?.alloc_code(entry, size, record)?)
}

/// Platform-independent optimisation; graphs are passed through unchanged
fn optimize(_graph: &mut Graph) {}

/// Compile every graph of a script, innermost function first, and return
/// the code of the top-level function
pub(crate) fn compile_script(rt: &RuntimeInner, graphs: Vec<Graph>) -> JitResult<Value> {
    let _scope = ScopeGuard::temporary(&rt.heap);
    let mut codes: Vec<Option<Value>> = vec![None; graphs.len()];
    for (index, graph) in graphs.into_iter().enumerate().rev() {
        let code = compile_unit(rt, graph, UnitKind::Function, &codes)?;
        codes[index] = Some(code);
    }
    codes
        .first()
        .copied()
        .flatten()
        .ok_or_else(|| JitError::internal("compile", "script produced no graphs"))
}

/// Compiled stub `name`, compiling it on first use
pub(crate) fn get_stub(rt: &RuntimeInner, name: &str) -> JitResult<Stub> {
    if let Some(stub) = rt.stubs.compiled(name) {
        return Ok(stub);
    }
    let source = rt.stubs.source(name)?;
    rt.stubs.begin(name)?;
    let result = build_stub(rt, name, source);
    rt.stubs.finish(name, result.as_ref().ok().copied());
    result
}

fn build_stub(rt: &RuntimeInner, name: &str, source: &StubSource) -> JitResult<Stub> {
    let _scope = ScopeGuard::persistent(&rt.heap);
    let code = match source {
        StubSource::Graph(body) => compile_unit(rt, body()?, UnitKind::Stub, &[])?,
        StubSource::Native(entry) => rt.heap()?.alloc_code(
            *entry,
            0,
            CodeRecord {
                name: name.to_owned(),
                ..CodeRecord::default()
            },
        )?,
    };
    let function = rt.heap()?.alloc_builtin_function(code)?;
    debug!(stub = name, "stub ready");
    Ok(Stub::new(function, code))
}
