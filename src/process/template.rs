/*!
 * Process Templates
 * Plain-text descriptors seeding randomized instruction streams
 */

use super::pcb::{Process, ProcessFactory};
use crate::bytecode::{encode, Instructions, Opcode};
use crate::core::types::{Cycles, Size};
use log::info;
use rand::Rng;
use std::path::Path;
use thiserror::Error;

/// Template operation result
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Template loading failures: fatal to that load only
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("template is missing the {0:?} header line")]
    MissingHeader(&'static str),

    #[error("line {line}: expected {header:?} header, found {found:?}")]
    BadHeader {
        line: usize,
        header: &'static str,
        found: String,
    },

    #[error("line {line}: unknown mnemonic {name:?}")]
    UnknownMnemonic { line: usize, name: String },

    #[error("line {line}: {name} takes no operand")]
    UnexpectedOperand { line: usize, name: String },

    #[error("line {line}: {name} is missing its operand")]
    MissingOperand { line: usize, name: String },

    #[error("line {line}: bad number {value:?}")]
    BadNumber { line: usize, value: String },

    #[error("intake channel closed")]
    IntakeClosed,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One symbolic instruction line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateOp {
    pub line: usize,
    pub name: String,
    pub operand: Option<i64>,
}

/// Parsed process template: a name, a memory requirement, and symbolic
/// instructions
#[derive(Debug, Clone)]
pub struct Template {
    pub name: String,
    pub memory: Size,
    pub instructions: Vec<TemplateOp>,
}

impl Template {
    /// Parse a descriptor: a `name` line, a `memory` line, then one
    /// `OPNAME [operand]` per line. Blank lines and `#` comments are
    /// skipped.
    pub fn parse(text: &str) -> TemplateResult<Template> {
        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l.trim()))
            .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'));

        let (_, name) = parse_header(lines.next(), "name")?;
        let (memory_line, memory_raw) = parse_header(lines.next(), "memory")?;
        let memory = memory_raw
            .parse::<Size>()
            .map_err(|_| TemplateError::BadNumber {
                line: memory_line,
                value: memory_raw.clone(),
            })?;

        let mut instructions = Vec::new();
        for (line, text) in lines {
            let mut fields = text.split_whitespace();
            let name = match fields.next() {
                Some(f) => f.to_string(),
                None => continue,
            };
            let operand = match fields.next() {
                Some(raw) => Some(raw.parse::<i64>().map_err(|_| TemplateError::BadNumber {
                    line,
                    value: raw.to_string(),
                })?),
                None => None,
            };
            instructions.push(TemplateOp { line, name, operand });
        }

        Ok(Template {
            name,
            memory,
            instructions,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> TemplateResult<Template> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Assemble the template verbatim (no jitter); returns the program
    /// and the runtime budget derived from summing CALC operands
    pub fn assemble(&self) -> TemplateResult<(Instructions, Cycles)> {
        self.assemble_jittered(|value| value)
    }

    /// Assemble with a perturbation applied to every numeric operand.
    /// Operand bytes saturate at 255; the runtime budget uses the same
    /// clamped values so the two stay consistent.
    pub fn assemble_jittered<F>(&self, mut jitter: F) -> TemplateResult<(Instructions, Cycles)>
    where
        F: FnMut(i64) -> i64,
    {
        let mut program = Instructions::new();
        let mut runtime: Cycles = 0;

        for op in &self.instructions {
            let opcode =
                Opcode::from_name(&op.name).ok_or_else(|| TemplateError::UnknownMnemonic {
                    line: op.line,
                    name: op.name.clone(),
                })?;
            let def = opcode.definition();

            let mut operands = Vec::new();
            match (def.widths.len(), op.operand) {
                (0, None) => {}
                (0, Some(_)) => {
                    return Err(TemplateError::UnexpectedOperand {
                        line: op.line,
                        name: op.name.clone(),
                    })
                }
                (_, None) => {
                    return Err(TemplateError::MissingOperand {
                        line: op.line,
                        name: op.name.clone(),
                    })
                }
                (_, Some(base)) => {
                    let value = jitter(base).clamp(0, 255) as u32;
                    if opcode == Opcode::Calc {
                        runtime += Cycles::from(value);
                    }
                    operands.push(value);
                }
            }

            program.append(encode(opcode, &operands));
        }

        Ok((program, runtime))
    }
}

/// Jitter template values to create custom processes and push them into
/// the scheduler's intake. Each operand is perturbed by a small signed
/// delta, clamped at zero.
pub fn spawn_variants<R: Rng>(
    factory: &ProcessFactory,
    template: &Template,
    count: usize,
    intake: &flume::Sender<Process>,
    rng: &mut R,
) -> TemplateResult<usize> {
    for i in 0..count {
        let (program, runtime) =
            template.assemble_jittered(|value| (value + rng.gen_range(-5..5)).max(0))?;

        let process = factory.create(
            format!("{}#{}", template.name, i),
            runtime,
            template.memory,
            program,
            0,
            None,
        );
        intake
            .send(process)
            .map_err(|_| TemplateError::IntakeClosed)?;
    }

    info!(
        "spawned {} variants of template {:?}",
        count, template.name
    );
    Ok(count)
}

fn parse_header(
    line: Option<(usize, &str)>,
    header: &'static str,
) -> TemplateResult<(usize, String)> {
    let (line_no, text) = line.ok_or(TemplateError::MissingHeader(header))?;
    let mut fields = text.split_whitespace();

    match fields.next() {
        Some(field) if field.eq_ignore_ascii_case(header) => {}
        _ => {
            return Err(TemplateError::BadHeader {
                line: line_no,
                header,
                found: text.to_string(),
            })
        }
    }

    match fields.next() {
        Some(value) => Ok((line_no, value.to_string())),
        None => Err(TemplateError::BadHeader {
            line: line_no,
            header,
            found: text.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = "\
name worker
memory 8

# busy loop then signal
CALC 30
SEND 7
FORK
NOP
";

    #[test]
    fn parses_headers_and_instructions() {
        let template = Template::parse(DESCRIPTOR).unwrap();
        assert_eq!(template.name, "worker");
        assert_eq!(template.memory, 8);
        assert_eq!(template.instructions.len(), 4);
        assert_eq!(template.instructions[0].operand, Some(30));
    }

    #[test]
    fn assemble_sums_calc_operands_into_runtime() {
        let template = Template::parse(DESCRIPTOR).unwrap();
        let (program, runtime) = template.assemble().unwrap();
        assert_eq!(runtime, 30);
        // CALC(2) + SEND(2) + FORK(1) + NOP(1)
        assert_eq!(program.len(), 6);
    }

    #[test]
    fn missing_header_is_rejected() {
        let err = Template::parse("CALC 3\n").unwrap_err();
        assert!(matches!(err, TemplateError::BadHeader { .. }));
    }

    #[test]
    fn operand_on_zero_width_op_is_rejected() {
        let template = Template::parse("name t\nmemory 4\nFORK 3\n").unwrap();
        let err = template.assemble().unwrap_err();
        assert!(matches!(err, TemplateError::UnexpectedOperand { .. }));
    }

    #[test]
    fn jitter_clamps_at_zero() {
        let template = Template::parse("name t\nmemory 4\nCALC 2\n").unwrap();
        let (_, runtime) = template.assemble_jittered(|v| v - 100).unwrap();
        assert_eq!(runtime, 0);
    }
}
