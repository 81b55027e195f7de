//! An 8-instruction Brainfuck machine and a program-synthesis task on top.
//!
//! Any instruction sequence runs to completion: the tape and its cells wrap,
//! unmatched brackets have fixed targets, and execution stops at a step
//! limit.

use serde::{Deserialize, Serialize};
use std::fmt;

use ds_types::{ConfigError, DsResult, Evaluator, ParameterSpace};

/// Execution stops after this many instructions unless configured otherwise.
pub const DEFAULT_STEP_LIMIT: usize = 8192;

/// Output bytes that differ from the target, or are missing from it, cost
/// their squared distance scaled into `[0, 1]`; every byte of length
/// mismatch costs this much on top.
pub const LENGTH_PENALTY: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instruction {
    Right,
    Left,
    Increment,
    Decrement,
    Output,
    Input,
    JumpForward,
    JumpBack,
}

impl Instruction {
    /// Every instruction, in slot-decoding order.
    pub const ALL: [Instruction; 8] = [
        Self::Right,
        Self::Left,
        Self::Increment,
        Self::Decrement,
        Self::Output,
        Self::Input,
        Self::JumpForward,
        Self::JumpBack,
    ];

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '>' => Some(Self::Right),
            '<' => Some(Self::Left),
            '+' => Some(Self::Increment),
            '-' => Some(Self::Decrement),
            '.' => Some(Self::Output),
            ',' => Some(Self::Input),
            '[' => Some(Self::JumpForward),
            ']' => Some(Self::JumpBack),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Right => '>',
            Self::Left => '<',
            Self::Increment => '+',
            Self::Decrement => '-',
            Self::Output => '.',
            Self::Input => ',',
            Self::JumpForward => '[',
            Self::JumpBack => ']',
        }
    }

    /// Map a sampled slot value to an instruction: `floor(value) mod 8`.
    pub fn from_value(value: f64) -> Self {
        let index = (value.floor() as i64).rem_euclid(Self::ALL.len() as i64);
        Self::ALL[index as usize]
    }
}

/// A compiled program with its jump targets resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    instructions: Vec<Instruction>,
    /// For bracket positions: the program counter to continue from when the
    /// jump is taken.
    jumps: Vec<usize>,
}

impl Program {
    /// Compile source text; characters outside the instruction set are
    /// ignored.
    pub fn compile(source: &str) -> Self {
        Self::from_instructions(source.chars().filter_map(Instruction::from_char).collect())
    }

    /// Resolve jumps for an instruction sequence.
    ///
    /// A matched bracket jumps just past its partner. An unmatched `[`
    /// jumps to the end of the program and an unmatched `]` back to its
    /// start.
    pub fn from_instructions(instructions: Vec<Instruction>) -> Self {
        let len = instructions.len();
        let mut jumps = vec![0; len];
        let mut open = Vec::new();
        for (pc, instruction) in instructions.iter().enumerate() {
            match instruction {
                Instruction::JumpForward => {
                    jumps[pc] = len;
                    open.push(pc);
                }
                Instruction::JumpBack => match open.pop() {
                    Some(start) => {
                        jumps[start] = pc + 1;
                        jumps[pc] = start + 1;
                    }
                    None => jumps[pc] = 0,
                },
                _ => {}
            }
        }
        Self {
            instructions,
            jumps,
        }
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instruction in &self.instructions {
            write!(f, "{}", instruction.as_char())?;
        }
        Ok(())
    }
}

/// Outcome of one program run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub output: Vec<u8>,
    pub steps: usize,
    /// The step limit stopped the program before it ran off its end.
    pub exhausted: bool,
}

/// A byte tape addressed modulo its length.
#[derive(Debug, Clone)]
pub struct Machine {
    memory: Vec<u8>,
    pointer: usize,
    step_limit: usize,
}

impl Machine {
    pub fn new(memory: usize) -> Self {
        Self {
            memory: vec![0; memory.max(1)],
            pointer: 0,
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    /// Clear the tape and move the pointer home.
    pub fn reset(&mut self) {
        self.memory.iter_mut().for_each(|c| *c = 0);
        self.pointer = 0;
    }

    /// Run `program` from its first instruction. `,` reads the next byte of
    /// `input`, or 0 once it is used up.
    pub fn run(&mut self, program: &Program, input: &[u8]) -> Execution {
        let len = self.memory.len();
        let mut input = input.iter().copied();
        let mut output = Vec::new();
        let mut pc = 0;
        let mut steps = 0;

        while pc < program.len() {
            if steps >= self.step_limit {
                return Execution {
                    output,
                    steps,
                    exhausted: true,
                };
            }
            steps += 1;

            let cell = &mut self.memory[self.pointer];
            match program.instructions[pc] {
                Instruction::Right => self.pointer = (self.pointer + 1) % len,
                Instruction::Left => self.pointer = (self.pointer + len - 1) % len,
                Instruction::Increment => *cell = cell.wrapping_add(1),
                Instruction::Decrement => *cell = cell.wrapping_sub(1),
                Instruction::Output => output.push(*cell),
                Instruction::Input => *cell = input.next().unwrap_or(0),
                Instruction::JumpForward if *cell == 0 => {
                    pc = program.jumps[pc];
                    continue;
                }
                Instruction::JumpBack if *cell != 0 => {
                    pc = program.jumps[pc];
                    continue;
                }
                Instruction::JumpForward | Instruction::JumpBack => {}
            }
            pc += 1;
        }

        Execution {
            output,
            steps,
            exhausted: false,
        }
    }
}

/// Search for a fixed-length program whose output matches a target.
///
/// Slot `i` of a candidate is decoded with [`Instruction::from_value`].
#[derive(Debug, Clone)]
pub struct ProgramSynthesis {
    target: Vec<u8>,
    input: Vec<u8>,
    memory: usize,
    step_limit: usize,
    space: ParameterSpace,
}

impl ProgramSynthesis {
    pub fn new(target: Vec<u8>, length: usize) -> Result<Self, ConfigError> {
        if target.is_empty() {
            return Err(ConfigError::Invalid {
                message: "target output must not be empty".to_string(),
            });
        }
        if length == 0 {
            return Err(ConfigError::Invalid {
                message: "program length must be positive".to_string(),
            });
        }
        Ok(Self {
            target,
            input: Vec::new(),
            memory: 64,
            step_limit: DEFAULT_STEP_LIMIT,
            space: ParameterSpace::new().add_scalars("program", length),
        })
    }

    pub fn with_input(mut self, input: Vec<u8>) -> Self {
        self.input = input;
        self
    }

    pub fn with_memory(mut self, cells: usize) -> Self {
        self.memory = cells;
        self
    }

    pub fn with_step_limit(mut self, limit: usize) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn target(&self) -> &[u8] {
        &self.target
    }

    pub fn decode(&self, parameters: &[f64]) -> Program {
        Program::from_instructions(parameters.iter().map(|&v| Instruction::from_value(v)).collect())
    }

    pub fn execute(&self, parameters: &[f64]) -> Execution {
        Machine::new(self.memory)
            .with_step_limit(self.step_limit)
            .run(&self.decode(parameters), &self.input)
    }
}

impl Evaluator for ProgramSynthesis {
    fn space(&self) -> &ParameterSpace {
        &self.space
    }

    fn evaluate(&self, parameters: &[f64]) -> DsResult<f64> {
        let output = self.execute(parameters).output;
        let scale = 255.0 * 255.0;
        let distance: f64 = self
            .target
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                let o = output.get(i).copied().unwrap_or(0);
                let diff = o as f64 - t as f64;
                diff * diff / scale
            })
            .sum();
        let mismatch = output.len().abs_diff(self.target.len()) as f64;
        Ok(distance + LENGTH_PENALTY * mismatch)
    }

    fn name(&self) -> &str {
        "brainfuck"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO: &str = concat!(
        "++++++++[>++++[>++>+++>+++>+<<<<-]>+>+>->>+[<]<-]>>",
        ".>---.+++++++..+++.>>.<-.<.+++.------.--------.>>+.>++.",
    );

    #[test]
    fn increments_and_outputs() {
        let mut machine = Machine::new(1);
        let run = machine.run(&Program::compile("++."), &[]);
        assert_eq!(run.output, vec![2]);
        assert_eq!(run.steps, 3);
        assert!(!run.exhausted);
    }

    #[test]
    fn loop_clears_cell() {
        let mut machine = Machine::new(4);
        let run = machine.run(&Program::compile("+[-]"), &[]);
        assert!(!run.exhausted);
        assert_eq!(machine.memory()[0], 0);
    }

    #[test]
    fn hello_world() {
        let program = Program::compile(HELLO);
        let mut machine = Machine::new(16).with_step_limit(100_000);
        let run = machine.run(&program, &[]);
        assert_eq!(run.output, b"Hello World!\n".to_vec());
        assert_eq!(program.to_string(), HELLO);
    }

    #[test]
    fn comments_are_ignored() {
        let program = Program::compile("add two: + + then print .");
        assert_eq!(program.to_string(), "++.");
    }

    #[test]
    fn tape_and_cells_wrap() {
        let mut machine = Machine::new(3);
        machine.run(&Program::compile("<+>-"), &[]);
        assert_eq!(machine.memory(), &[255, 0, 1]);
        assert_eq!(machine.pointer(), 0);

        machine.reset();
        assert_eq!(machine.memory(), &[0, 0, 0]);
    }

    #[test]
    fn input_reads_bytes_then_zero() {
        let mut machine = Machine::new(2);
        let run = machine.run(&Program::compile(",.,.,."), &[65, 66]);
        assert_eq!(run.output, vec![65, 66, 0]);
    }

    #[test]
    fn unmatched_brackets_are_tolerated() {
        let run = Machine::new(2).run(&Program::compile("[+."), &[]);
        assert_eq!(run.output, Vec::<u8>::new());
        assert!(!run.exhausted);

        let run = Machine::new(2)
            .with_step_limit(100)
            .run(&Program::compile("+]."), &[]);
        assert!(run.exhausted);
        assert_eq!(run.steps, 100);
        assert!(run.output.is_empty());
    }

    #[test]
    fn step_limit_halts_infinite_loops() {
        let run = Machine::new(1).run(&Program::compile("+[]"), &[]);
        assert!(run.exhausted);
        assert_eq!(run.steps, DEFAULT_STEP_LIMIT);
    }

    #[test]
    fn slot_values_decode_modulo_eight() {
        assert_eq!(Instruction::from_value(2.9), Instruction::Increment);
        assert_eq!(Instruction::from_value(12.0), Instruction::Output);
        assert_eq!(Instruction::from_value(-6.5), Instruction::Left);
        assert_eq!(Instruction::from_value(-0.1), Instruction::JumpBack);
    }

    #[test]
    fn synthesis_loss_is_zero_for_exact_output() {
        let task = ProgramSynthesis::new(vec![2], 3).unwrap();
        let params = [2.3, 2.9, 4.0];
        assert_eq!(task.decode(&params).to_string(), "++.");
        assert_eq!(task.evaluate(&params).unwrap(), 0.0);

        let off_by_one = ProgramSynthesis::new(vec![3], 3).unwrap();
        let loss = off_by_one.evaluate(&params).unwrap();
        assert!((loss - 1.0 / (255.0 * 255.0)).abs() < 1e-15);
    }

    #[test]
    fn synthesis_penalises_length_mismatch() {
        let task = ProgramSynthesis::new(vec![1, 1], 2).unwrap();
        // "+." prints one byte of the two expected.
        let loss = task.evaluate(&[2.0, 4.0]).unwrap();
        let expected = 1.0 / (255.0 * 255.0) + LENGTH_PENALTY;
        assert!((loss - expected).abs() < 1e-12);
        assert!(ProgramSynthesis::new(Vec::new(), 4).is_err());
    }
}
