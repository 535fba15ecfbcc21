//! Embedding API: the runtime, compiled functions and host callbacks

mod ops;
mod trampoline;

use std::cell::{RefCell, RefMut};
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;

use cranelift_codegen::ir::Signature;
use kiln_heap::{Heap, HostValue, ScopeGuard, Value};
use kiln_ir::IcKind;
use tracing::{debug, info};

use crate::compiler::{self, Backend};
use crate::config::JitConfig;
use crate::context::{ContextStack, RuntimeContext};
use crate::error::{JitError, JitResult, RuntimeError};
use crate::ic::{self, IcRegistry, IcStats};
use crate::stubs::{Stub, StubLibrary};

use trampoline::Callbacks;

/// Machine-level signature of every generated function
type Entry = unsafe extern "C" fn(*const RuntimeContext, u64, u64, *const u64, u64) -> u64;

/// State shared by the runtime, its functions and the callbacks generated
/// code makes into the host
pub(crate) struct RuntimeInner {
    pub(crate) config: JitConfig,
    pub(crate) heap: RefCell<Heap>,
    backend: RefCell<Backend>,
    pub(crate) signature: Signature,
    pub(crate) stubs: StubLibrary,
    pub(crate) ics: IcRegistry,
    pub(crate) contexts: ContextStack,
    callbacks: Callbacks,
    pending_error: RefCell<Option<RuntimeError>>,
    pub(crate) output: RefCell<Box<dyn Write>>,
    context: Box<RuntimeContext>,
    pub(crate) undefined: Value,
}

impl RuntimeInner {
    pub(crate) fn heap(&self) -> JitResult<RefMut<'_, Heap>> {
        self.heap
            .try_borrow_mut()
            .map_err(|_| JitError::internal("heap", "heap is already borrowed"))
    }

    pub(crate) fn backend(&self) -> JitResult<RefMut<'_, Backend>> {
        self.backend
            .try_borrow_mut()
            .map_err(|_| JitError::internal("backend", "JIT module is already borrowed"))
    }

    pub(crate) fn stub(&self, name: &str) -> JitResult<Stub> {
        compiler::get_stub(self, name)
    }

    pub(crate) fn runtime_id(&self, name: &str) -> JitResult<usize> {
        self.callbacks.id(name)
    }

    pub(crate) fn new_ic(&self, kind: IcKind) -> JitResult<Value> {
        ic::new_ic(self, kind)
    }

    /// Park `err` until the current call into generated code returns; the
    /// first error wins
    pub(crate) fn record_error(&self, err: RuntimeError) {
        match self.pending_error.try_borrow_mut() {
            Ok(mut pending) => {
                if pending.is_none() {
                    *pending = Some(err);
                }
            }
            Err(_) => tracing::error!(error = %err, "dropped runtime error"),
        }
    }

    fn take_error(&self) -> Option<RuntimeError> {
        self.pending_error.borrow_mut().take()
    }

    /// Call `function` with `this` and `args` through its current code
    fn invoke(&self, function: Value, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
        let entry = {
            let heap = self.heap()?;
            let code = heap.function_code(function)?;
            heap.code_entry(code)?
        };
        let argv: Vec<u64> = args.iter().map(|v| v.raw()).collect();
        self.take_error();

        // SAFETY: every Code entry is either generated with the shared
        // signature or the `runtime` trampoline, which has the same ABI.
        let result = unsafe {
            let entry: Entry = std::mem::transmute(entry);
            entry(
                &*self.context,
                function.raw(),
                this.raw(),
                argv.as_ptr(),
                argv.len() as u64,
            )
        };
        match self.take_error() {
            Some(err) => Err(err),
            None => Ok(Value::from_raw(result)),
        }
    }

    fn install_builtins(&self) -> JitResult<()> {
        // `typeError` hands this out, so it must exist before any call.
        self.stub("noop")?;
        let log = self.stub("log")?;
        let mut heap = self.heap()?;
        let global = self.context.global();
        let key = heap.string("log")?;
        heap.set_property(global, key, log.function())?;
        Ok(())
    }
}

/// A JIT runtime: heap, compiled code, stubs and inline caches
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("stubs", &self.stub_count())
            .field("ics", &self.inner.ics.stats().len())
            .finish()
    }
}

impl Runtime {
    /// Create a runtime with a fresh heap and global object
    pub fn new(config: JitConfig) -> JitResult<Self> {
        let mut heap = Heap::with_config(config.heap.clone())?;
        let global = heap.new_global()?;
        heap.root(global);
        let undefined = heap.undefined();
        let context = Box::new(RuntimeContext::new(global, heap.young_cursor() as usize));

        let backend = Backend::new(config.opt_level)?;
        let signature = backend.signature().clone();
        let stubs = StubLibrary::standard(trampoline::runtime_entry as *const () as usize)?;
        let mut callbacks = Callbacks::default();
        ops::register(&mut callbacks)?;

        let inner = Rc::new(RuntimeInner {
            config,
            heap: RefCell::new(heap),
            backend: RefCell::new(backend),
            signature,
            stubs,
            ics: IcRegistry::default(),
            contexts: ContextStack::default(),
            callbacks,
            pending_error: RefCell::new(None),
            output: RefCell::new(Box::new(io::stdout())),
            context,
            undefined,
        });
        inner.context.set_runtime(Rc::as_ptr(&inner) as usize);
        inner.install_builtins()?;

        debug!(
            stubs = inner.stubs.declared_count(),
            callbacks = inner.callbacks.len(),
            opt_level = %inner.config.opt_level,
            "runtime ready"
        );
        Ok(Self { inner })
    }

    /// Compile a script into its top-level function
    pub fn compile(&self, source: &str) -> JitResult<Function> {
        let graphs = kiln_frontend::construct(source)?;
        info!(functions = graphs.len(), "compiling script");
        let code = compiler::compile_script(&self.inner, graphs)?;

        // Outside any scope, so the function is a process-lifetime root.
        let value = {
            let mut heap = self.inner.heap()?;
            let value = heap.alloc_function(code)?;
            heap.root(value);
            value
        };
        Ok(Function {
            rt: Rc::clone(&self.inner),
            value,
        })
    }

    /// Compile and run a script, returning its completion value
    pub fn eval(&self, source: &str) -> Result<Value, RuntimeError> {
        self.compile(source)?.call(&[])
    }

    /// Decode `value` for the host
    pub fn inspect(&self, value: Value) -> JitResult<HostValue> {
        Ok(self.inner.heap()?.inspect(value))
    }

    /// Render `value` the way `log` prints it
    pub fn display(&self, value: Value) -> JitResult<String> {
        Ok(self.inner.heap()?.to_display_string(value))
    }

    /// Redirect `log` output
    pub fn set_output(&self, output: impl Write + 'static) {
        *self.inner.output.borrow_mut() = Box::new(output);
    }

    /// Current value of global `name`
    pub fn global(&self, name: &str) -> JitResult<Value> {
        let _scope = ScopeGuard::temporary(&self.inner.heap);
        let mut heap = self.inner.heap()?;
        let key = heap.string(name)?;
        Ok(heap.get_property(self.inner.context.global(), key)?)
    }

    /// `value` as a callable function, if it is one
    pub fn function(&self, value: Value) -> JitResult<Option<Function>> {
        let is_function = self.inner.heap()?.is_function(value);
        Ok(is_function.then(|| Function {
            rt: Rc::clone(&self.inner),
            value,
        }))
    }

    /// State of every inline cache created so far
    pub fn ic_stats(&self) -> Vec<IcStats> {
        self.inner.ics.stats()
    }

    /// Number of stubs compiled so far
    pub fn stub_count(&self) -> usize {
        self.inner.stubs.compiled_count()
    }

    /// Depth of the compile context stack; zero between compiles
    pub fn context_depth(&self) -> usize {
        self.inner.contexts.depth()
    }
}

/// A compiled function bound to its runtime
#[derive(Clone)]
pub struct Function {
    rt: Rc<RuntimeInner>,
    value: Value,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Function").field(&self.value).finish()
    }
}

impl Function {
    /// Call with the global object as `this`
    pub fn call(&self, args: &[Value]) -> Result<Value, RuntimeError> {
        let global = self.rt.context.global();
        self.call_with_this(global, args)
    }

    /// Call with an explicit receiver
    pub fn call_with_this(&self, this: Value, args: &[Value]) -> Result<Value, RuntimeError> {
        self.rt.invoke(self.value, this, args)
    }

    /// The tagged Function object
    pub fn value(&self) -> Value {
        self.value
    }
}
