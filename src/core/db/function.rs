//! User-Defined Function Registry
//!
//! Bridges Rust callables into the engine's callback protocol. Every
//! callback runs synchronously inside `Statement::step`, on the stepping
//! thread. Errors and panics raised by a callback are converted into an
//! SQL error on the running statement; nothing unwinds across the C
//! boundary.
//!
//! # Examples
//!
//! ```
//! use sqlbridge::{Connection, FunctionImpl, Value};
//!
//! let conn = Connection::open_in_memory()?;
//! conn.create_function(
//!     "double",
//!     FunctionImpl::scalar(1, |_ctx, args| {
//!         Ok(Value::from(args[0].as_i64().unwrap_or(0) * 2))
//!     })
//!     .deterministic(),
//! )?;
//!
//! let mut stmt = conn.prepare("SELECT double(21)")?;
//! assert!(stmt.step()?);
//! assert_eq!(stmt.column_int64(0), 42);
//! # Ok::<_, sqlbridge::Error>(())
//! ```
use std::any::Any;
use std::ffi::CString;
use std::fmt;
use std::os::raw::{c_char, c_int, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;

use rusqlite::ffi;

use super::raw::{self, RawDb};
use super::value::{Value, ValueRef};
use crate::core::error::{EngineError, Error, Phase, Result, ResultCode};

/// Longest function name the engine accepts, in bytes.
pub const MAX_NAME_LEN: usize = 255;

/// Largest fixed argument count the engine accepts.
pub const MAX_ARITY: u8 = 127;

/// Outcome of a user callback. Any error type can be returned; an
/// [`Error`] keeps its result code when reported to the engine.
pub type CallbackResult<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

type ScalarFn = dyn Fn(&mut Context<'_>, &[ValueRef<'_>]) -> CallbackResult<Value>;

/// Number of arguments a function accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Fixed(u8),
    Variadic,
}

impl Arity {
    fn as_c_int(self) -> c_int {
        match self {
            Arity::Fixed(n) => c_int::from(n),
            Arity::Variadic => -1,
        }
    }
}

/// Per-group state of an aggregate function.
///
/// A fresh instance is created for every group (and for every window
/// partition); `finalize` is called exactly once per instance.
pub trait AggregateFunction {
    /// Accumulates one row.
    fn step(&mut self, ctx: &mut Context<'_>, args: &[ValueRef<'_>]) -> CallbackResult<()>;

    /// Produces the group's result. Called on a fresh instance when the
    /// group has no rows.
    fn finalize(&mut self, ctx: &mut Context<'_>) -> CallbackResult<Value>;
}

/// An aggregate that can also run as a window function over a sliding
/// frame.
pub trait WindowFunction: AggregateFunction {
    /// Removes a row that left the frame.
    fn inverse(&mut self, ctx: &mut Context<'_>, args: &[ValueRef<'_>]) -> CallbackResult<()>;

    /// Current result for the frame, without ending the group.
    fn value(&mut self, ctx: &mut Context<'_>) -> CallbackResult<Value>;
}

/// Callbacks of a function.
pub enum FunctionBody {
    Scalar(Box<ScalarFn>),
    Aggregate(Box<dyn Fn() -> Box<dyn AggregateFunction>>),
    Window(Box<dyn Fn() -> Box<dyn WindowFunction>>),
}

impl fmt::Debug for FunctionBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            FunctionBody::Scalar(_) => "Scalar",
            FunctionBody::Aggregate(_) => "Aggregate",
            FunctionBody::Window(_) => "Window",
        };
        f.write_str(kind)
    }
}

/// Description of a function to register with
/// [`Connection::create_function`](super::Connection::create_function).
#[derive(Debug)]
pub struct FunctionImpl {
    pub arity: Arity,
    /// Same arguments always give the same result. Lets the engine factor
    /// calls out of loops and permits use in indexes; declaring a function
    /// deterministic when it is not gives undefined query results.
    pub deterministic: bool,
    /// Callable only from top-level SQL, not from triggers, views or
    /// schema expressions.
    pub direct_only: bool,
    pub body: FunctionBody,
}

impl FunctionImpl {
    fn new(arity: Arity, body: FunctionBody) -> Self {
        FunctionImpl {
            arity,
            deterministic: false,
            direct_only: false,
            body,
        }
    }

    /// A scalar function taking exactly `arity` arguments.
    pub fn scalar<F>(arity: u8, f: F) -> Self
    where
        F: Fn(&mut Context<'_>, &[ValueRef<'_>]) -> CallbackResult<Value> + 'static,
    {
        Self::new(Arity::Fixed(arity), FunctionBody::Scalar(Box::new(f)))
    }

    /// A scalar function taking any number of arguments.
    pub fn variadic<F>(f: F) -> Self
    where
        F: Fn(&mut Context<'_>, &[ValueRef<'_>]) -> CallbackResult<Value> + 'static,
    {
        Self::new(Arity::Variadic, FunctionBody::Scalar(Box::new(f)))
    }

    /// An aggregate; `factory` creates the state for each group.
    pub fn aggregate<A, F>(arity: Arity, factory: F) -> Self
    where
        A: AggregateFunction + 'static,
        F: Fn() -> A + 'static,
    {
        let boxed = move || -> Box<dyn AggregateFunction> { Box::new(factory()) };
        Self::new(arity, FunctionBody::Aggregate(Box::new(boxed)))
    }

    /// A window function, also usable as a plain aggregate.
    pub fn window<W, F>(arity: Arity, factory: F) -> Self
    where
        W: WindowFunction + 'static,
        F: Fn() -> W + 'static,
    {
        let boxed = move || -> Box<dyn WindowFunction> { Box::new(factory()) };
        Self::new(arity, FunctionBody::Window(Box::new(boxed)))
    }

    pub fn deterministic(mut self) -> Self {
        self.deterministic = true;
        self
    }

    pub fn direct_only(mut self) -> Self {
        self.direct_only = true;
        self
    }

    fn flags(&self) -> c_int {
        let mut flags = ffi::SQLITE_UTF8 as c_int;
        if self.deterministic {
            flags |= ffi::SQLITE_DETERMINISTIC as c_int;
        }
        if self.direct_only {
            flags |= ffi::SQLITE_DIRECTONLY as c_int;
        }
        flags
    }
}

/// Invocation context handed to callbacks.
///
/// Scoped to value-level services; it cannot reach the statement being
/// stepped or its connection.
pub struct Context<'a> {
    ctx: *mut ffi::sqlite3_context,
    name: &'a str,
}

impl<'a> Context<'a> {
    /// Name the function was registered under.
    pub fn name(&self) -> &str {
        self.name
    }

    /// Auxiliary data previously attached to argument `arg`, if it is
    /// still cached and of type `T`.
    ///
    /// The engine keeps auxiliary data only while the argument is a
    /// constant of the same statement, which makes it suitable for
    /// caching work derived from that argument (a compiled pattern, for
    /// instance).
    pub fn aux_data<T: Any>(&self, arg: usize) -> Option<&T> {
        let ptr = unsafe { ffi::sqlite3_get_auxdata(self.ctx, arg as c_int) };
        if ptr.is_null() {
            return None;
        }
        let data = unsafe { &*(ptr as *const Box<dyn Any>) };
        data.downcast_ref::<T>()
    }

    /// Attaches `data` to argument `arg`, replacing any previous value.
    pub fn set_aux_data<T: Any>(&mut self, arg: usize, data: T) {
        let boxed: Box<Box<dyn Any>> = Box::new(Box::new(data));
        unsafe {
            ffi::sqlite3_set_auxdata(
                self.ctx,
                arg as c_int,
                Box::into_raw(boxed) as *mut c_void,
                Some(free_aux_data),
            )
        };
    }
}

unsafe extern "C" fn free_aux_data(ptr: *mut c_void) {
    drop(Box::from_raw(ptr as *mut Box<dyn Any>));
}

/// Callbacks and name kept alive by the engine as the function's user data.
struct Registration {
    name: String,
    body: FunctionBody,
}

impl Registration {
    fn new_state(&self) -> Box<dyn WindowFunction> {
        match &self.body {
            FunctionBody::Aggregate(factory) => Box::new(AggregateOnly(factory())),
            FunctionBody::Window(factory) => factory(),
            // Scalars never receive aggregate callbacks.
            FunctionBody::Scalar(_) => Box::new(AggregateOnly(Box::new(NoState))),
        }
    }
}

/// Presents a plain aggregate through the window interface; the engine
/// never calls `inverse` or `value` on functions registered as aggregates.
struct AggregateOnly(Box<dyn AggregateFunction>);

impl AggregateFunction for AggregateOnly {
    fn step(&mut self, ctx: &mut Context<'_>, args: &[ValueRef<'_>]) -> CallbackResult<()> {
        self.0.step(ctx, args)
    }

    fn finalize(&mut self, ctx: &mut Context<'_>) -> CallbackResult<Value> {
        self.0.finalize(ctx)
    }
}

impl WindowFunction for AggregateOnly {
    fn inverse(&mut self, _ctx: &mut Context<'_>, _args: &[ValueRef<'_>]) -> CallbackResult<()> {
        Err("aggregate function used as a window function".into())
    }

    fn value(&mut self, _ctx: &mut Context<'_>) -> CallbackResult<Value> {
        Err("aggregate function used as a window function".into())
    }
}

struct NoState;

impl AggregateFunction for NoState {
    fn step(&mut self, _ctx: &mut Context<'_>, _args: &[ValueRef<'_>]) -> CallbackResult<()> {
        Ok(())
    }

    fn finalize(&mut self, _ctx: &mut Context<'_>) -> CallbackResult<Value> {
        Ok(Value::Null)
    }
}

/// Registers `function` under `name` on `db`.
pub(crate) fn register(db: RawDb, name: &str, function: FunctionImpl) -> Result<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(Error::range(format!(
            "function name of {} bytes exceeds {} bytes",
            name.len(),
            MAX_NAME_LEN
        )));
    }
    if let Arity::Fixed(n) = function.arity {
        if n > MAX_ARITY {
            return Err(Error::range(format!(
                "function {:?} declares {} arguments, at most {} allowed",
                name, n, MAX_ARITY
            )));
        }
    }
    let c_name: CString = raw::to_cstring("function name", name).map_err(|e| Error::classify(Phase::Other, e))?;
    let flags = function.flags();
    let arity = function.arity.as_c_int();

    let registration = Box::new(Registration {
        name: name.to_string(),
        body: function.body,
    });
    let is_window = matches!(registration.body, FunctionBody::Window(_));
    let is_scalar = matches!(registration.body, FunctionBody::Scalar(_));
    let user_data = Box::into_raw(registration) as *mut c_void;

    // On failure the engine still calls the destructor, so ownership of
    // `user_data` passes to it unconditionally.
    let rc = unsafe {
        if is_window {
            ffi::sqlite3_create_window_function(
                db.as_ptr(),
                c_name.as_ptr(),
                arity,
                flags,
                user_data,
                Some(call_step),
                Some(call_final),
                Some(call_value),
                Some(call_inverse),
                Some(drop_registration),
            )
        } else if is_scalar {
            ffi::sqlite3_create_function_v2(
                db.as_ptr(),
                c_name.as_ptr(),
                arity,
                flags,
                user_data,
                Some(call_scalar),
                None,
                None,
                Some(drop_registration),
            )
        } else {
            ffi::sqlite3_create_function_v2(
                db.as_ptr(),
                c_name.as_ptr(),
                arity,
                flags,
                user_data,
                None,
                Some(call_step),
                Some(call_final),
                Some(drop_registration),
            )
        }
    };
    if rc != ffi::SQLITE_OK {
        return Err(Error::classify(Phase::Other, db.error_for(rc)));
    }
    Ok(())
}

unsafe extern "C" fn drop_registration(user_data: *mut c_void) {
    if !user_data.is_null() {
        drop(Box::from_raw(user_data as *mut Registration));
    }
}

unsafe fn registration<'a>(ctx: *mut ffi::sqlite3_context) -> &'a Registration {
    &*(ffi::sqlite3_user_data(ctx) as *const Registration)
}

unsafe fn value_ref<'a>(value: *mut ffi::sqlite3_value) -> ValueRef<'a> {
    match ffi::sqlite3_value_type(value) {
        ffi::SQLITE_INTEGER => ValueRef::Integer(ffi::sqlite3_value_int64(value)),
        ffi::SQLITE_FLOAT => ValueRef::Float(ffi::sqlite3_value_double(value)),
        ffi::SQLITE_TEXT => {
            // The pointer must be fetched before the length.
            let text = ffi::sqlite3_value_text(value) as *const c_void;
            ValueRef::Text(raw::bytes_from(text, ffi::sqlite3_value_bytes(value)))
        }
        ffi::SQLITE_BLOB => {
            let blob = ffi::sqlite3_value_blob(value);
            ValueRef::Blob(raw::bytes_from(blob, ffi::sqlite3_value_bytes(value)))
        }
        _ => ValueRef::Null,
    }
}

unsafe fn arguments<'a>(argc: c_int, argv: *mut *mut ffi::sqlite3_value) -> Vec<ValueRef<'a>> {
    if argc <= 0 || argv.is_null() {
        return Vec::new();
    }
    std::slice::from_raw_parts(argv, argc as usize)
        .iter()
        .map(|&value| value_ref(value))
        .collect()
}

unsafe fn set_result(ctx: *mut ffi::sqlite3_context, value: &Value) {
    match value {
        Value::Null => ffi::sqlite3_result_null(ctx),
        Value::Integer(i) => ffi::sqlite3_result_int64(ctx, *i),
        Value::Float(f) => ffi::sqlite3_result_double(ctx, *f),
        Value::Text(s) => match raw::len_to_c_int("text result", s.len()) {
            Ok(len) => ffi::sqlite3_result_text(ctx, s.as_ptr() as *const c_char, len, ffi::SQLITE_TRANSIENT()),
            Err(_) => ffi::sqlite3_result_error_toobig(ctx),
        },
        Value::Blob(b) if b.is_empty() => ffi::sqlite3_result_zeroblob(ctx, 0),
        Value::Blob(b) => match raw::len_to_c_int("blob result", b.len()) {
            Ok(len) => ffi::sqlite3_result_blob(ctx, b.as_ptr() as *const c_void, len, ffi::SQLITE_TRANSIENT()),
            Err(_) => ffi::sqlite3_result_error_toobig(ctx),
        },
    }
}

unsafe fn set_error(ctx: *mut ffi::sqlite3_context, err: &(dyn std::error::Error + Send + Sync + 'static)) {
    let message = err.to_string();
    let len = c_int::try_from(message.len()).unwrap_or(c_int::MAX);
    ffi::sqlite3_result_error(ctx, message.as_ptr() as *const c_char, len);
    if let Some(code) = err.downcast_ref::<Error>().map(Error::code) {
        if code != ResultCode::ERROR {
            ffi::sqlite3_result_error_code(ctx, code.0);
        }
    }
}

fn panic_message(name: &str, payload: Box<dyn Any + Send>) -> EngineError {
    let detail = if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    EngineError::new(ResultCode::ERROR, format!("function {} panicked: {}", name, detail))
}

/// Runs `f` with panics contained, then reports its outcome to the engine.
unsafe fn report<F>(ctx: *mut ffi::sqlite3_context, f: F)
where
    F: FnOnce(&Registration) -> CallbackResult<Option<Value>>,
{
    let reg = registration(ctx);
    match catch_unwind(AssertUnwindSafe(|| f(reg))) {
        Ok(Ok(Some(value))) => set_result(ctx, &value),
        Ok(Ok(None)) => {}
        Ok(Err(err)) => set_error(ctx, err.as_ref()),
        Err(payload) => {
            let err = Error::Engine(panic_message(&reg.name, payload));
            set_error(ctx, &err);
        }
    }
}

unsafe extern "C" fn call_scalar(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    let args = arguments(argc, argv);
    report(ctx, |reg| {
        let FunctionBody::Scalar(f) = &reg.body else {
            return Err("scalar callback on a non-scalar function".into());
        };
        let mut context = Context { ctx, name: &reg.name };
        f(&mut context, &args).map(Some)
    });
}

/// Slot in the engine-managed aggregate context holding the group state.
type StateSlot = *mut Box<dyn WindowFunction>;

/// Per-group state, created on first use. `None` only when the engine
/// cannot allocate the slot.
unsafe fn group_state<'a>(ctx: *mut ffi::sqlite3_context, reg: &Registration) -> Option<&'a mut Box<dyn WindowFunction>> {
    let slot = ffi::sqlite3_aggregate_context(ctx, std::mem::size_of::<StateSlot>() as c_int) as *mut StateSlot;
    if slot.is_null() {
        return None;
    }
    if (*slot).is_null() {
        *slot = Box::into_raw(Box::new(reg.new_state()));
    }
    Some(&mut **slot)
}

/// Removes the group state for finalization; `None` if no row was seen.
unsafe fn take_group_state(ctx: *mut ffi::sqlite3_context) -> Option<Box<Box<dyn WindowFunction>>> {
    let slot = ffi::sqlite3_aggregate_context(ctx, 0) as *mut StateSlot;
    if slot.is_null() || (*slot).is_null() {
        return None;
    }
    let state = Box::from_raw(*slot);
    *slot = ptr::null_mut();
    Some(state)
}

unsafe extern "C" fn call_step(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    let args = arguments(argc, argv);
    report(ctx, |reg| {
        let Some(state) = group_state(ctx, reg) else {
            ffi::sqlite3_result_error_nomem(ctx);
            return Ok(None);
        };
        let mut context = Context { ctx, name: &reg.name };
        state.step(&mut context, &args).map(|()| None)
    });
}

unsafe extern "C" fn call_inverse(
    ctx: *mut ffi::sqlite3_context,
    argc: c_int,
    argv: *mut *mut ffi::sqlite3_value,
) {
    let args = arguments(argc, argv);
    report(ctx, |reg| {
        let Some(state) = group_state(ctx, reg) else {
            ffi::sqlite3_result_error_nomem(ctx);
            return Ok(None);
        };
        let mut context = Context { ctx, name: &reg.name };
        state.inverse(&mut context, &args).map(|()| None)
    });
}

unsafe extern "C" fn call_value(ctx: *mut ffi::sqlite3_context) {
    report(ctx, |reg| {
        let Some(state) = group_state(ctx, reg) else {
            ffi::sqlite3_result_error_nomem(ctx);
            return Ok(None);
        };
        let mut context = Context { ctx, name: &reg.name };
        state.value(&mut context).map(Some)
    });
}

unsafe extern "C" fn call_final(ctx: *mut ffi::sqlite3_context) {
    report(ctx, |reg| {
        let mut state = take_group_state(ctx).unwrap_or_else(|| Box::new(reg.new_state()));
        let mut context = Context { ctx, name: &reg.name };
        state.finalize(&mut context).map(Some)
    });
}
