//! Round-robin over terminals. Each tick hands the CPU to the next active
//! terminal's owning process. Processes of one terminal never preempt each other.

pub mod context;

use crate::config::{MAX_PROCESSES, SHELL};
use crate::drivers::keyboard::scancodes::KeyCode;
use crate::drivers::tty::{KeyAction, TerminalId};
use crate::kernel::KernelState;
use crate::machine::Machine;
use crate::memory::program_slot;
use crate::syscalls::lifecycle::PROCESS_LIMIT_MESSAGE;
use crate::syscalls::Transfer;

impl<'a> KernelState<'a> {
    /// Timer tick: pick the next active terminal and point the address space at it.
    pub fn tick<M: Machine>(&mut self, machine: &mut M) -> Transfer {
        let current = self.terminals.scheduled();
        let Some(next) = self.terminals.next_active(current) else {
            return Transfer::Stay;
        };
        if next == current {
            return Transfer::Stay;
        }
        let record = self.terminals.get(next);
        let Some(owner) = record.owner else {
            return Transfer::Stay;
        };
        if record.context.is_empty() {
            crate::log_warn!("scheduler: terminal {} has no parked flow, staying on {}", next.0, current.0);
            return Transfer::Stay;
        }

        self.address_space.map_program(machine, program_slot(owner));
        let page = self.terminals.video_page(next);
        self.address_space.map_terminal_video(machine, page);
        machine.set_kernel_stack(self.processes.kernel_stack_top(owner));
        self.terminals.set_scheduled(next);
        Transfer::Switch { from: current, to: next }
    }

    /// Show terminal `to`. A terminal that never ran gets a fresh shell.
    pub fn switch_terminal<M: Machine>(&mut self, machine: &mut M, to: TerminalId) -> Transfer {
        let from = self.terminals.displayed();
        if to == from {
            return Transfer::Stay;
        }
        let scheduled = self.terminals.scheduled();

        if self.terminals.get(to).active {
            self.terminals.switch_display(machine, to);
            // The scheduled process may have its screen mapped; follow it to its new home.
            let page = self.terminals.video_page(scheduled);
            self.address_space.map_terminal_video(machine, page);
            crate::log_info!("terminal: displaying {}", to.0);
            return Transfer::Stay;
        }

        if self.processes.live_count() >= MAX_PROCESSES {
            self.terminals.write(machine, from, PROCESS_LIMIT_MESSAGE);
            crate::log_warn!("terminal: no process left to start terminal {}", to.0);
            return Transfer::Stay;
        }

        self.terminals.switch_display(machine, to);
        match self.spawn(machine, to, SHELL, &[], Some(scheduled)) {
            Ok(launch) => {
                self.terminals.set_scheduled(to);
                self.address_space.map_terminal_video(machine, None);
                crate::log_info!("terminal: started shell on {}", to.0);
                Transfer::Launch(launch)
            }
            Err(err) => {
                crate::log_error!("terminal: could not start shell on {}: {}", to.0, err);
                self.terminals.switch_display(machine, from);
                Transfer::Stay
            }
        }
    }

    /// Feed one key to the displayed terminal.
    pub fn handle_key<M: Machine>(&mut self, machine: &mut M, key: KeyCode) -> Transfer {
        match self.terminals.receive_key(machine, key) {
            KeyAction::Handled => Transfer::Stay,
            KeyAction::SwitchTo(to) => self.switch_terminal(machine, to),
        }
    }
}
