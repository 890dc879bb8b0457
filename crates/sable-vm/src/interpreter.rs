//! Bytecode interpreter

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use sable_bytecode::{BytecodeError, Cursor, Opcode, eval_binary, eval_unary};

use crate::config::VmConfig;
use crate::error::{VmError, VmResult};
use crate::native::{NativeFn, NativeRegistry};
use crate::stack::ValueStack;

/// How a successful run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Reached a `HALT`
    Halted,
    /// Ran past the last instruction
    EndOfCode,
}

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// How execution stopped
    pub completion: Completion,
    /// Instructions dispatched
    pub instructions_executed: u64,
    /// Native callbacks invoked
    pub natives_called: u64,
    /// Stack contents from bottom to top
    pub final_stack: Vec<i32>,
}

/// Stack-based bytecode interpreter
pub struct Vm {
    config: VmConfig,
    natives: NativeRegistry,
    stack: ValueStack,
    memory: Vec<i32>,
    strings: Vec<String>,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Interpreter with default limits
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    /// Interpreter with explicit limits
    pub fn with_config(config: VmConfig) -> Self {
        Self {
            stack: ValueStack::with_limit(config.max_stack_bytes),
            memory: vec![0; config.memory_words],
            natives: NativeRegistry::new(),
            strings: Vec::new(),
            config,
        }
    }

    /// Active configuration
    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Replace the configuration; takes effect on the next run
    pub fn set_config(&mut self, config: VmConfig) {
        self.config = config;
    }

    /// Bind `name` to a host callback, replacing any previous binding
    pub fn register_native<F>(&mut self, name: impl Into<String>, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        let name = name.into();
        if self.natives.register(name.clone(), Arc::new(callback)) {
            tracing::debug!(name, "replaced native function");
        }
    }

    /// Bind an already shared callback
    pub fn register_native_shared(&mut self, name: impl Into<String>, callback: NativeFn) {
        self.natives.register(name, callback);
    }

    /// Remove a binding; returns whether it existed
    pub fn unregister_native(&mut self, name: &str) -> bool {
        self.natives.unregister(name)
    }

    /// Remove every binding
    pub fn clear_natives(&mut self) {
        self.natives.clear();
    }

    /// Is `name` bound
    pub fn has_native(&self, name: &str) -> bool {
        self.natives.contains(name)
    }

    /// Registered native functions
    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    /// Stack left by the last run, bottom to top
    pub fn stack_values(&self) -> Vec<i32> {
        self.stack.values()
    }

    /// Top of the stack left by the last run
    pub fn top(&self) -> Option<i32> {
        self.stack.peek()
    }

    /// VM memory after the last run
    pub fn memory(&self) -> &[i32] {
        &self.memory
    }

    /// Strings interned by `PUSH_STR` during the last run
    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    /// Execute `bytecode`, reporting only success or failure
    pub fn run(&mut self, bytecode: &[u8]) -> bool {
        match self.execute(bytecode) {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(error = %err, "vm run failed");
                false
            }
        }
    }

    /// Execute `bytecode` from offset 0
    pub fn execute(&mut self, bytecode: &[u8]) -> VmResult<ExecutionOutcome> {
        self.reset();

        let mut cursor = Cursor::new(bytecode);
        let mut executed = 0u64;
        let mut natives_called = 0u64;

        let completion = loop {
            if cursor.is_at_end() {
                break Completion::EndOfCode;
            }
            if executed >= self.config.max_instructions {
                return Err(VmError::InstructionLimit(self.config.max_instructions));
            }
            executed += 1;

            let address = cursor.position();
            let byte = cursor.read_u8()?;
            let opcode = Opcode::from_byte(byte).ok_or(VmError::UnknownOpcode(byte))?;
            tracing::trace!(address, op = opcode.name(), depth = self.stack.depth(), "dispatch");

            match opcode {
                Opcode::PushInt | Opcode::PushFloat => {
                    let value = read_imm(&mut cursor, address)?;
                    self.push(value)?;
                }
                Opcode::PushStr => {
                    let text = cursor.read_cstr()?;
                    let index = self.intern(text);
                    self.push(index)?;
                }
                Opcode::Pop => {
                    self.pop(address)?;
                }
                Opcode::Dup => {
                    let value = self.stack.peek().ok_or(VmError::StackUnderflow(address))?;
                    self.push(value)?;
                }
                Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Mod
                | Opcode::And
                | Opcode::Or
                | Opcode::CmpEq
                | Opcode::CmpGt => {
                    let rhs = self.pop(address)?;
                    let lhs = self.pop(address)?;
                    let value = eval_binary(opcode, lhs, rhs).ok_or(VmError::DivByZero(address))?;
                    self.push(value)?;
                }
                Opcode::Not => {
                    let value = self.pop(address)?;
                    self.push(eval_unary(opcode, value).unwrap_or_default())?;
                }
                Opcode::Jmp => {
                    let delta = read_imm(&mut cursor, address)?;
                    jump(&mut cursor, bytecode.len(), address, delta)?;
                }
                Opcode::JmpIfZero | Opcode::JmpIfNotZero => {
                    // operand first, then the condition
                    let delta = read_imm(&mut cursor, address)?;
                    let condition = self.pop(address)?;
                    let taken = (condition == 0) == (opcode == Opcode::JmpIfZero);
                    if taken {
                        jump(&mut cursor, bytecode.len(), address, delta)?;
                    }
                }
                Opcode::CallNative => {
                    let name = cursor.read_cstr()?;
                    self.call_native(name)?;
                    natives_called += 1;
                }
                Opcode::LoadMem => {
                    let addr = self.pop(address)?;
                    let slot = self.memory_index(addr)?;
                    let value = self.memory[slot];
                    self.push(value)?;
                }
                Opcode::StoreMem => {
                    let value = self.pop(address)?;
                    let addr = self.pop(address)?;
                    let slot = self.memory_index(addr)?;
                    self.memory[slot] = value;
                }
                Opcode::Nop => {}
                Opcode::Halt => break Completion::Halted,
            }
        };

        tracing::debug!(
            instructions = executed,
            natives = natives_called,
            depth = self.stack.depth(),
            ?completion,
            "vm run finished"
        );

        Ok(ExecutionOutcome {
            completion,
            instructions_executed: executed,
            natives_called,
            final_stack: self.stack.values(),
        })
    }

    fn reset(&mut self) {
        self.stack.clear();
        self.stack.set_limit(self.config.max_stack_bytes);
        self.strings.clear();
        self.memory.clear();
        self.memory.resize(self.config.memory_words, 0);
    }

    fn push(&mut self, value: i32) -> VmResult<()> {
        if self.stack.push(value) {
            Ok(())
        } else {
            Err(VmError::StackOverflow(self.config.max_stack_bytes))
        }
    }

    fn pop(&mut self, address: usize) -> VmResult<i32> {
        self.stack.pop().ok_or(VmError::StackUnderflow(address))
    }

    fn intern(&mut self, text: &str) -> i32 {
        let index = match self.strings.iter().position(|s| s == text) {
            Some(index) => index,
            None => {
                self.strings.push(text.to_string());
                self.strings.len() - 1
            }
        };
        index as i32
    }

    fn memory_index(&self, addr: i32) -> VmResult<usize> {
        usize::try_from(addr)
            .ok()
            .filter(|&slot| slot < self.memory.len())
            .ok_or(VmError::MemoryOutOfBounds(addr))
    }

    fn call_native(&mut self, name: &str) -> VmResult<()> {
        if !self.config.permits_native(name) {
            return Err(VmError::NativeCallDenied(name.to_string()));
        }
        let callback = self
            .natives
            .get(name)
            .cloned()
            .ok_or_else(|| VmError::UnknownNativeFn(name.to_string()))?;
        tracing::debug!(name, "calling native function");
        catch_unwind(AssertUnwindSafe(|| callback()))
            .map_err(|_| VmError::NativePanicked(name.to_string()))
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("config", &self.config)
            .field("natives", &self.natives)
            .field("depth", &self.stack.depth())
            .finish()
    }
}

fn read_imm(cursor: &mut Cursor<'_>, address: usize) -> VmResult<i32> {
    cursor.read_i32_le().map_err(|_| VmError::Truncated(address))
}

/// Move to `end of operand + delta`. Landing exactly on the end is allowed
/// and finishes the run.
fn jump(cursor: &mut Cursor<'_>, len: usize, address: usize, delta: i32) -> VmResult<()> {
    let target = cursor.position() as i64 + i64::from(delta);
    if target < 0 || target > len as i64 {
        return Err(VmError::JumpOutOfBounds {
            from: address,
            target,
        });
    }
    cursor
        .seek(target as usize)
        .map_err(|_: BytecodeError| VmError::JumpOutOfBounds { from: address, target })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_bytecode::BytecodeBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn program(f: impl FnOnce(&mut BytecodeBuilder)) -> Vec<u8> {
        let mut b = BytecodeBuilder::new();
        f(&mut b);
        b.build().unwrap()
    }

    #[test]
    fn test_binary_operand_order() {
        let code = program(|b| {
            b.push_int(10).push_int(3).op(Opcode::Sub).halt();
        });
        let mut vm = Vm::new();
        assert!(vm.run(&code));
        assert_eq!(vm.stack_values(), vec![7]);
    }

    #[test]
    fn test_div_by_zero_fails() {
        let code = program(|b| {
            b.push_int(1).push_int(0).op(Opcode::Div).halt();
        });
        let mut vm = Vm::new();
        assert_eq!(vm.execute(&code), Err(VmError::DivByZero(10)));
        assert!(!vm.run(&code));
    }

    #[test]
    fn test_underflow_is_an_error() {
        let code = program(|b| {
            b.push_int(1).op(Opcode::Add).halt();
        });
        assert_eq!(Vm::new().execute(&code), Err(VmError::StackUnderflow(5)));
    }

    #[test]
    fn test_unknown_opcode() {
        assert_eq!(Vm::new().execute(&[0xEE]), Err(VmError::UnknownOpcode(0xEE)));
    }

    #[test]
    fn test_truncated_operand() {
        assert_eq!(Vm::new().execute(&[0x01, 0x00]), Err(VmError::Truncated(0)));
    }

    #[test]
    fn test_falling_off_the_end_succeeds() {
        let code = program(|b| {
            b.push_int(4);
        });
        let outcome = Vm::new().execute(&code).unwrap();
        assert_eq!(outcome.completion, Completion::EndOfCode);
        assert_eq!(outcome.final_stack, vec![4]);
    }

    #[test]
    fn test_conditional_jump_pops_condition() {
        let code = program(|b| {
            let skip = b.new_label();
            b.push_int(0)
                .jump(Opcode::JmpIfZero, skip)
                .push_int(111)
                .bind(skip)
                .push_int(5)
                .halt();
        });
        let mut vm = Vm::new();
        assert!(vm.run(&code));
        assert_eq!(vm.stack_values(), vec![5]);
    }

    #[test]
    fn test_jump_if_not_zero_falls_through_on_zero() {
        let code = program(|b| {
            let skip = b.new_label();
            b.push_int(0)
                .jump(Opcode::JmpIfNotZero, skip)
                .push_int(111)
                .bind(skip)
                .halt();
        });
        let mut vm = Vm::new();
        assert!(vm.run(&code));
        assert_eq!(vm.stack_values(), vec![111]);
    }

    #[test]
    fn test_jump_out_of_bounds() {
        let code = program(|b| {
            b.jump_raw(Opcode::Jmp, 100);
        });
        assert!(matches!(
            Vm::new().execute(&code),
            Err(VmError::JumpOutOfBounds { from: 0, target: 105 })
        ));
    }

    #[test]
    fn test_jump_to_end_finishes() {
        let code = program(|b| {
            b.push_int(1).jump_raw(Opcode::Jmp, 0);
        });
        let outcome = Vm::new().execute(&code).unwrap();
        assert_eq!(outcome.completion, Completion::EndOfCode);
    }

    #[test]
    fn test_instruction_limit_stops_loops() {
        let code = program(|b| {
            let top = b.new_label();
            b.bind(top).jump(Opcode::Jmp, top);
        });
        let mut vm = Vm::with_config(VmConfig {
            max_instructions: 50,
            ..VmConfig::default()
        });
        assert_eq!(vm.execute(&code), Err(VmError::InstructionLimit(50)));
    }

    #[test]
    fn test_stack_overflow() {
        let code = program(|b| {
            b.push_int(1).push_int(2).push_int(3);
        });
        let mut vm = Vm::with_config(VmConfig {
            max_stack_bytes: 8,
            ..VmConfig::default()
        });
        assert_eq!(vm.execute(&code), Err(VmError::StackOverflow(8)));
    }

    #[test]
    fn test_native_calls() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let code = program(|b| {
            b.call_native("Tick").unwrap();
            b.call_native("Tick").unwrap();
            b.halt();
        });
        let mut vm = Vm::new();
        vm.register_native("Tick", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let outcome = vm.execute(&code).unwrap();
        assert_eq!(outcome.natives_called, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_native_fails() {
        let code = program(|b| {
            b.call_native("Unknown").unwrap();
            b.halt();
        });
        let mut vm = Vm::new();
        assert_eq!(
            vm.execute(&code),
            Err(VmError::UnknownNativeFn("Unknown".to_string()))
        );
        assert!(!vm.run(&code));
    }

    #[test]
    fn test_native_denied_by_allowlist() {
        let code = program(|b| {
            b.call_native("Exit").unwrap();
        });
        let mut vm = Vm::with_config(VmConfig {
            native_allowlist: vec!["Print".into()],
            ..VmConfig::default()
        });
        vm.register_native("Exit", || {});
        assert_eq!(
            vm.execute(&code),
            Err(VmError::NativeCallDenied("Exit".to_string()))
        );
    }

    #[test]
    fn test_native_panic_is_contained() {
        let code = program(|b| {
            b.call_native("Boom").unwrap();
        });
        let mut vm = Vm::new();
        vm.register_native("Boom", || panic!("boom"));
        assert_eq!(
            vm.execute(&code),
            Err(VmError::NativePanicked("Boom".to_string()))
        );
    }

    #[test]
    fn test_memory_load_store() {
        let code = program(|b| {
            b.push_int(3)
                .push_int(42)
                .op(Opcode::StoreMem)
                .push_int(3)
                .op(Opcode::LoadMem)
                .halt();
        });
        let mut vm = Vm::new();
        assert!(vm.run(&code));
        assert_eq!(vm.stack_values(), vec![42]);
        assert_eq!(vm.memory()[3], 42);
    }

    #[test]
    fn test_memory_out_of_bounds() {
        let code = program(|b| {
            b.push_int(-1).op(Opcode::LoadMem);
        });
        assert_eq!(Vm::new().execute(&code), Err(VmError::MemoryOutOfBounds(-1)));
    }

    #[test]
    fn test_push_str_interns() {
        let code = program(|b| {
            b.push_str("a").unwrap();
            b.push_str("b").unwrap();
            b.push_str("a").unwrap();
        });
        let mut vm = Vm::new();
        assert!(vm.run(&code));
        assert_eq!(vm.stack_values(), vec![0, 1, 0]);
        assert_eq!(vm.strings(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_failed_run_does_not_leak_into_next() {
        let bad = program(|b| {
            b.push_int(7).push_int(1).push_int(0).op(Opcode::Div).halt();
        });
        let good = program(|b| {
            b.push_int(2).halt();
        });
        let mut vm = Vm::new();
        assert!(!vm.run(&bad));
        assert!(vm.run(&good));
        assert_eq!(vm.stack_values(), vec![2]);
    }

    #[test]
    fn test_unregister_native() {
        let mut vm = Vm::new();
        vm.register_native("A", || {});
        assert!(vm.has_native("A"));
        assert!(vm.unregister_native("A"));
        vm.register_native("B", || {});
        vm.clear_natives();
        assert!(vm.natives().is_empty());
    }
}
