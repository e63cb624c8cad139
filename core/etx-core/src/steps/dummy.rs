use crate::error::EtxResult;
use crate::step::{StepContext, StepPlugin};

/// Pass-through step.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dummy;

impl Dummy {
    pub const KEY: &'static str = "Dummy";
}

impl StepPlugin for Dummy {
    fn process_row(&mut self, ctx: &mut StepContext) -> EtxResult<bool> {
        match ctx.get_row()? {
            Some(row) => {
                ctx.put_row(row)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
