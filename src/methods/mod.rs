//! Descriptors, registration options and registration façades for supported LSP methods.
//!
//! | Method                     | Policy      | Partial results | Resolve            |
//! |----------------------------|-------------|-----------------|--------------------|
//! | `textDocument/codeLens`    | independent | yes             | `codeLens/resolve` |
//! | `textDocument/references`  | independent | yes             | no                 |
//! | `workspace/executeCommand` | ordered     | no              | no                 |

mod code_lens;
mod execute_command;
mod references;

pub use self::{
    code_lens::{CodeLens, CodeLensRegistrationOptions, CodeLensResolve},
    execute_command::{ExecuteCommand, ExecuteCommandRegistrationOptions},
    references::{ReferenceRegistrationOptions, References},
};
