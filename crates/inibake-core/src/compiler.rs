//! Branch compilation.
//!
//! Source sections write blocks as `If,<cond>,Begin` ... `End`, and branches
//! may nest by embedding another `If` on the same line. The compiler folds
//! these into a tree: every `If`/`Else` ends up with a [`Body::Compiled`]
//! list and no `Begin`/`End` survives. Structural mistakes are reported here,
//! before any command runs.

use std::collections::VecDeque;

use crate::command::{Body, Command, CommandKind};
use crate::error::ScriptError;

/// Compiles a parsed section. `max_depth` bounds `If`/`Else` nesting.
pub fn compile(commands: Vec<Command>, max_depth: usize) -> Result<Vec<Command>, ScriptError> {
    let mut queue: VecDeque<Command> = commands.into();
    compile_list(&mut queue, 0, max_depth)
}

fn compile_list(
    queue: &mut VecDeque<Command>,
    depth: usize,
    max_depth: usize,
) -> Result<Vec<Command>, ScriptError> {
    let mut out = Vec::with_capacity(queue.len());
    let mut else_eligible = false;

    while let Some(mut cmd) = queue.pop_front() {
        cmd.depth = depth;
        match &cmd.kind {
            CommandKind::Comment => {}
            CommandKind::Begin => {
                return Err(ScriptError::grammar("[Begin] must be used with [If] or [Else]").with_raw(cmd.raw))
            }
            CommandKind::End => {
                return Err(ScriptError::grammar("[End] must be matched with [Begin]").with_raw(cmd.raw))
            }
            CommandKind::If { .. } => {
                compile_branch(&mut cmd, queue, depth, max_depth)?;
                else_eligible = true;
            }
            CommandKind::Else { body } => {
                if !else_eligible {
                    return Err(ScriptError::grammar("[Else] must be used after [If]").with_raw(cmd.raw));
                }
                // Only an else-if keeps the chain open for another Else.
                let chains = matches!(body, Body::Embedded(inner) if matches!(inner.kind, CommandKind::If { .. }));
                compile_branch(&mut cmd, queue, depth, max_depth)?;
                else_eligible = chains;
            }
            _ => else_eligible = false,
        }
        out.push(cmd);
    }
    Ok(out)
}

/// Replaces the embedded body of an `If`/`Else` with its compiled form.
fn compile_branch(
    cmd: &mut Command,
    queue: &mut VecDeque<Command>,
    depth: usize,
    max_depth: usize,
) -> Result<(), ScriptError> {
    if depth >= max_depth {
        return Err(ScriptError::grammar(format!(
            "Branch nesting exceeds the maximum depth of [{}]",
            max_depth
        ))
        .with_raw(cmd.raw.clone()));
    }
    let raw = cmd.raw.clone();
    let body = match &mut cmd.kind {
        CommandKind::If { body, .. } | CommandKind::Else { body } => body,
        _ => return Ok(()),
    };
    let inner = match std::mem::replace(body, Body::Compiled(Vec::new())) {
        Body::Embedded(inner) => *inner,
        compiled => {
            *body = compiled;
            return Ok(());
        }
    };

    let compiled = match inner.kind {
        CommandKind::Else { .. } | CommandKind::End | CommandKind::Comment => {
            return Err(ScriptError::grammar(format!(
                "[{}] cannot be embedded in a branch",
                inner.kind.name()
            ))
            .with_raw(raw));
        }
        CommandKind::Begin => {
            let mut block = collect_block(queue).map_err(|e| e.with_raw(raw))?;
            compile_list(&mut block, depth + 1, max_depth)?
        }
        CommandKind::If { .. } => {
            let mut nested = inner;
            nested.depth = depth + 1;
            compile_branch(&mut nested, queue, depth + 1, max_depth)?;
            vec![nested]
        }
        _ => {
            let mut single = inner;
            single.depth = depth + 1;
            vec![single]
        }
    };
    *body = Body::Compiled(compiled);
    Ok(())
}

/// True if the command is an `If`/`Else` chain that ends in `Begin`.
fn opens_block(cmd: &Command) -> bool {
    match &cmd.kind {
        CommandKind::If { body: Body::Embedded(inner), .. } | CommandKind::Else { body: Body::Embedded(inner) } => {
            matches!(inner.kind, CommandKind::Begin) || opens_block(inner)
        }
        _ => false,
    }
}

/// Takes commands up to the `End` matching an already consumed `Begin`.
fn collect_block(queue: &mut VecDeque<Command>) -> Result<VecDeque<Command>, ScriptError> {
    let mut block = VecDeque::new();
    let mut level = 0usize;
    while let Some(cmd) = queue.pop_front() {
        if matches!(cmd.kind, CommandKind::End) {
            if level == 0 {
                return Ok(block);
            }
            level -= 1;
        } else if opens_block(&cmd) {
            level += 1;
        }
        block.push_back(cmd);
    }
    Err(ScriptError::grammar("[Begin] must be matched with [End]"))
}
