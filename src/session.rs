use std::rc::{Rc};
use std::time::{Duration};

use bytemuck::{Pod};

use crate::bindings::*;
use crate::buffer::*;
use crate::command::*;
use crate::config::*;
use crate::error::*;
use crate::marshal::*;
use crate::pipeline::*;
use crate::records::*;
use crate::shader::*;
use crate::sync::*;
use crate::vulkan::*;

// Everything needed to run one batch. Fields drop in declaration
// order, so command pool and pipeline go before the buffers they
// reference, and the device goes last.
pub struct ComputeSession {
    commands    : CommandRecorder,
    pipeline    : Pipeline,
    bindings    : ResourceBindings,
    device      : Rc<VulkanDevice>,
    layout      : BatchLayout,
    geometry    : (u32, u32, u32),
    timeout     : Duration,
    state       : DispatchState,
}


// Where a session stands between host access and device execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    // Command buffer recorded and never submitted
    Recorded,
    // Last submission finished, the buffer must be recorded again
    Completed,
    // Last submission timed out or failed. The device may still be
    // using the buffers and the command pool.
    Aborted,
}

impl DispatchState {
    // Fails once a dispatch has been aborted
    pub fn check_usable(self) -> Result<()> {
        match self {
            DispatchState::Aborted => Err(Error::SessionAborted(
                "A previous dispatch timed out or failed, the session must be dropped".into())),
            _ => Ok(()),
        }
    }

    pub fn needs_record(self) -> bool {
        self == DispatchState::Completed
    }

    // State after a submission returned `result`
    pub fn after_dispatch(result : &Result<()>) -> Self {
        match result {
            Ok(()) => DispatchState::Completed,
            Err(_) => DispatchState::Aborted,
        }
    }
}

impl ComputeSession {
    pub fn new(config : &DispatchConfig, layout : BatchLayout) -> Result<Self> {
        config.validate()?;

        if layout.record_count != config.total_work_items as usize {
            return Err(Error::Config(format!(
                "Batch holds {} records, but {} work items are configured",
                layout.record_count, config.total_work_items)));
        }

        let info = VulkanInfo::new()
            .adapter_index(config.adapter_index)
            .debug(config.validation);

        let instance = Rc::new(VulkanInstance::new(&info)?);
        let device = Rc::new(VulkanDevice::new(&instance, &info)?);

        let input = Buffer::new(&device, BufferRole::Input,
            BufferInfo::for_role(BufferRole::Input, layout.input_size()))?;
        let output = Buffer::new(&device, BufferRole::Output,
            BufferInfo::for_role(BufferRole::Output, layout.output_size()))?;

        let bindings = ResourceBindings::new(&device, input, output)?;

        let kernel = KernelModule::from_file(&config.kernel_path)?;
        let pipeline = Pipeline::new(&device, &kernel, &bindings, config.workgroup_size)?;

        let geometry = dispatch_geometry(config.total_work_items, config.workgroup_size)?;
        check_limits(geometry, config.workgroup_size, device.limits())?;

        let commands = CommandRecorder::new(&device)?;
        commands.record(&pipeline, &bindings, geometry)?;

        tracing::info!(
            work_items = config.total_work_items,
            workgroup_size = config.workgroup_size,
            workgroups = geometry.0,
            "session ready on {}", device.name());

        Ok(Self {
            commands    : commands,
            pipeline    : pipeline,
            bindings    : bindings,
            device      : device,
            layout      : layout,
            geometry    : geometry,
            timeout     : config.timeout,
            state       : DispatchState::Recorded,
        })
    }

    pub fn layout(&self) -> BatchLayout {
        self.layout
    }

    pub fn geometry(&self) -> (u32, u32, u32) {
        self.geometry
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    // Writes one record per work item into the input buffer
    pub fn write_inputs<T : Pod>(&mut self, records : &[T]) -> Result<()> {
        self.state.check_usable()?;
        self.check_stride::<T>(self.layout.input_stride)?;

        if records.len() != self.layout.record_count {
            return Err(Error::Config(format!(
                "Expected {} input records, got {}", self.layout.record_count, records.len())));
        }

        upload_records(&mut self.bindings.input_mut().buffer, records)
    }

    // Submits the recorded dispatch and waits for it to finish. One-time
    // command buffers are recorded again for every further dispatch. A
    // failed or timed out dispatch leaves the session unusable.
    pub fn dispatch(&mut self) -> Result<()> {
        self.state.check_usable()?;

        if self.state.needs_record() {
            self.commands.record(&self.pipeline, &self.bindings, self.geometry)?;
        }

        let result = submit_and_wait(self.device.as_ref(), self.commands.command_buffer(), self.timeout);
        self.state = DispatchState::after_dispatch(&result);
        result
    }

    // Reads one record per work item from the output buffer
    pub fn read_outputs<T : Pod>(&self) -> Result<Vec<T>> {
        self.state.check_usable()?;
        self.check_stride::<T>(self.layout.output_stride)?;
        download_records(&self.bindings.output().buffer, self.layout.record_count)
    }

    // Uploads inputs, runs the kernel once and returns its outputs
    pub fn run_batch<I : Pod, O : Pod>(&mut self, inputs : &[I]) -> Result<Vec<O>> {
        self.write_inputs(inputs)?;
        self.dispatch()?;
        self.read_outputs()
    }

    fn check_stride<T : Pod>(&self, stride : usize) -> Result<()> {
        let size = std::mem::size_of::<T>();

        if size != stride {
            return Err(Error::RecordLayout {
                len     : size,
                stride  : stride,
            });
        }

        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_dispatch_records_again() {
        let state = DispatchState::Recorded;

        assert!(state.check_usable().is_ok());
        assert!(!state.needs_record());

        let state = DispatchState::after_dispatch(&Ok(()));

        assert_eq!(state, DispatchState::Completed);
        assert!(state.check_usable().is_ok());
        assert!(state.needs_record());
    }

    #[test]
    fn timed_out_dispatch_aborts_session() {
        let result = Err(Error::DispatchTimeout(Duration::from_millis(20)));
        let state = DispatchState::after_dispatch(&result);

        assert_eq!(state, DispatchState::Aborted);

        let Err(e) = state.check_usable() else {
            panic!("Aborted session must not be usable");
        };

        assert!(matches!(e, Error::SessionAborted(_)));
        assert_eq!(e.class(), ErrorClass::Execution);
    }

    #[test]
    fn lost_device_aborts_session() {
        let result = Err(Error::FenceWait(ash::vk::Result::ERROR_DEVICE_LOST));

        assert_eq!(DispatchState::after_dispatch(&result), DispatchState::Aborted);
        assert!(!DispatchState::Aborted.needs_record());
    }
}
