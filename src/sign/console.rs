use color_eyre::Result;

use super::{SignInterface, SignObject, strip_control};

/// Debug transport that prints sign writes instead of touching hardware,
/// selected with `--device cli`
#[derive(Default)]
pub struct ConsoleSign;

impl SignInterface for ConsoleSign {
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn disconnect(&mut self) {}

    fn clear_memory(&mut self) -> Result<()> {
        log::info!("sign: clear memory");
        Ok(())
    }

    fn allocate(&mut self, objects: &[SignObject]) -> Result<()> {
        let labels: String = objects.iter().map(SignObject::label).collect();
        log::info!("sign: allocate [{labels}]");
        Ok(())
    }

    fn set_run_sequence(&mut self, objects: &[SignObject]) -> Result<()> {
        let labels: String = objects.iter().map(SignObject::label).collect();
        log::info!("sign: run sequence [{labels}]");
        Ok(())
    }

    fn write(&mut self, object: &SignObject) -> Result<()> {
        match object {
            SignObject::Str(s) => {
                log::info!("sign: string {} = '{}'", s.label, strip_control(&s.data));
            }
            SignObject::Text(t) => {
                log::info!("sign: text {} = '{}'", t.label, strip_control(&t.data));
            }
            SignObject::Clock(c) => {
                log::info!(
                    "sign: clock set ({} hour)",
                    if c.twenty_four_hour { 24 } else { 12 }
                );
            }
        }
        Ok(())
    }
}
