use crate::protocol;
use crate::telemetry::Transport;
use crate::Error;
use std::time::{Duration, Instant};

pub const BAUD_RATE: u32 = 115_200;

#[derive(Debug)]
pub struct BmuPort {
    serial: Box<dyn serialport::SerialPort>,
    last_exchange: Instant,
    delay: Duration,
}

impl BmuPort {
    pub fn open(port: &str, timeout: Duration) -> std::result::Result<Self, Error> {
        Ok(Self {
            serial: serialport::new(port, BAUD_RATE)
                .data_bits(serialport::DataBits::Eight)
                .parity(serialport::Parity::None)
                .stop_bits(serialport::StopBits::One)
                .flow_control(serialport::FlowControl::None)
                .timeout(timeout)
                .open()
                .map_err(std::io::Error::from)?,
            last_exchange: Instant::now(),
            delay: protocol::MINIMUM_DELAY,
        })
    }

    pub fn set_delay(&mut self, delay: Duration) {
        self.delay = Duration::max(delay, protocol::MINIMUM_DELAY);
    }

    fn await_pacing(&self) {
        let last_exchange_diff = Instant::now().duration_since(self.last_exchange);
        if let Some(time_until_delay_reached) = self.delay.checked_sub(last_exchange_diff) {
            std::thread::sleep(time_until_delay_reached);
        }
    }

    fn drain_pending(&mut self) -> std::result::Result<(), Error> {
        // stale bytes from an earlier reply would shift every offset in this one
        loop {
            let pending = self
                .serial
                .bytes_to_read()
                .map_err(std::io::Error::from)?;
            if pending > 0 {
                log::trace!("Got {} pending bytes", pending);
                let mut buf: Vec<u8> = vec![0; protocol::MAX_REPLY_LENGTH];
                let received = self.serial.read(buf.as_mut_slice())?;
                log::trace!("Dropped {} pending bytes", received);
            } else {
                break;
            }
        }
        Ok(())
    }
}

impl Transport for BmuPort {
    fn exchange(
        &mut self,
        request: [u8; protocol::REQUEST_LENGTH],
        reply_size: usize,
    ) -> std::result::Result<Vec<u8>, Error> {
        self.drain_pending()?;
        self.await_pacing();

        log::trace!("send: {:02X?}", request);
        self.serial.write_all(&request)?;

        let mut rx_buffer = vec![0; reply_size];
        let mut received = 0;
        while received < reply_size {
            match self.serial.read(&mut rx_buffer[received..]) {
                Ok(0) => break,
                Ok(count) => received += count,
                Err(error) if error.kind() == std::io::ErrorKind::TimedOut => break,
                Err(error) => return Err(error.into()),
            }
        }
        rx_buffer.truncate(received);
        self.last_exchange = Instant::now();

        log::trace!("receive: {:02X?}", rx_buffer);
        Ok(rx_buffer)
    }
}

pub fn available_ports() -> std::result::Result<Vec<String>, Error> {
    let mut names: Vec<String> = serialport::available_ports()
        .map_err(std::io::Error::from)?
        .into_iter()
        .map(|port| port.port_name)
        .collect();
    names.sort();
    Ok(names)
}

pub fn first_available_port() -> std::result::Result<Option<String>, Error> {
    Ok(available_ports()?.into_iter().next())
}
